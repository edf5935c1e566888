//! Implementation of the `stackvisor check` command.

use std::path::Path;
use std::process::ExitCode;

use stackvisor::{Descriptor, Error};

/// Validates the descriptor and the dependency graph, then prints the start order.
pub fn run(config: &Path) -> Result<ExitCode, Error> {
    let descriptor = Descriptor::load(config)?;
    let graph = descriptor.graph()?;

    println!(
        "{} ({}): {} services, descriptor OK",
        descriptor.name,
        descriptor.network,
        graph.len()
    );
    for (i, name) in graph.start_order().enumerate() {
        let deps = graph.dependencies(name);
        if deps.is_empty() {
            println!("  {}. {name}", i + 1);
        } else {
            println!("  {}. {name} (after {})", i + 1, deps.join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}
