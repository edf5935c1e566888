//! # Argument and environment templates.
//!
//! Command arguments and environment values may reference deployment values:
//!
//! | Placeholder          | Expands to                                     |
//! |----------------------|------------------------------------------------|
//! | `{secret}`           | path of the shared secret file                 |
//! | `{network}`          | deployment network (`mainnet`, `sepolia`, ...) |
//! | `{service}`          | the service's own name                         |
//! | `{mount:<path>}`     | host path of the mount declared for `<path>`   |
//! | `{{` / `}}`          | literal brace                                  |
//!
//! `{secret}` is only allowed for services with `requires_secret = true`.

use std::path::PathBuf;

use crate::deployment::Network;
use crate::error::ProcessError;
use crate::services::spec::ServiceSpec;

/// Deployment values available to templates.
#[derive(Clone, Debug)]
pub struct LaunchContext {
    /// Deployment network.
    pub network: Network,
    /// Path of the provisioned secret, if any.
    pub secret_path: Option<PathBuf>,
}

impl LaunchContext {
    /// Expands every placeholder in `template` for `spec`.
    pub fn expand(&self, spec: &ServiceSpec, template: &str) -> Result<String, ProcessError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(pos) = rest.find(['{', '}']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") || tail.starts_with("}}") {
                out.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with('}') {
                return Err(template_error(spec, template, "unmatched '}'"));
            }

            let close = tail
                .find('}')
                .ok_or_else(|| template_error(spec, template, "unterminated '{'"))?;
            out.push_str(&self.resolve(spec, template, &tail[1..close])?);
            rest = &tail[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Expands the program and every argument.
    pub fn expand_args(&self, spec: &ServiceSpec) -> Result<Vec<String>, ProcessError> {
        spec.command()
            .args
            .iter()
            .map(|a| self.expand(spec, a))
            .collect()
    }

    fn resolve(&self, spec: &ServiceSpec, template: &str, key: &str) -> Result<String, ProcessError> {
        match key {
            "network" => Ok(self.network.as_str().to_owned()),
            "service" => Ok(spec.name().to_owned()),
            "secret" => {
                if !spec.requires_secret() {
                    return Err(template_error(
                        spec,
                        template,
                        "{secret} used but requires_secret is false",
                    ));
                }
                self.secret_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .ok_or_else(|| template_error(spec, template, "no secret provisioned"))
            }
            _ => match key.strip_prefix("mount:") {
                Some(container) => spec
                    .mount_for(container)
                    .map(|m| m.host.display().to_string())
                    .ok_or_else(|| {
                        template_error(spec, template, &format!("no mount declared for '{container}'"))
                    }),
                None => Err(template_error(
                    spec,
                    template,
                    &format!("unknown placeholder '{{{key}}}'"),
                )),
            },
        }
    }
}

fn template_error(spec: &ServiceSpec, template: &str, reason: &str) -> ProcessError {
    ProcessError::Template(format!(
        "service '{}': template '{template}': {reason}",
        spec.name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::spec::Mount;

    fn ctx() -> LaunchContext {
        LaunchContext {
            network: Network::Sepolia,
            secret_path: Some(PathBuf::from("/run/jwt.hex")),
        }
    }

    fn execution() -> ServiceSpec {
        ServiceSpec::builder("execution")
            .command("reth", ["node"])
            .mount(Mount::read_write("/srv/reth", "/data"))
            .requires_secret(true)
            .build()
    }

    #[test]
    fn expands_known_placeholders() {
        let spec = execution();
        let c = ctx();
        assert_eq!(c.expand(&spec, "--chain={network}").unwrap(), "--chain=sepolia");
        assert_eq!(
            c.expand(&spec, "{secret}").unwrap(),
            "/run/jwt.hex"
        );
        assert_eq!(
            c.expand(&spec, "--datadir={mount:/data}/db").unwrap(),
            "--datadir=/srv/reth/db"
        );
        assert_eq!(c.expand(&spec, "{{literal}}").unwrap(), "{literal}");
    }

    #[test]
    fn secret_requires_opt_in() {
        let spec = ServiceSpec::builder("metrics")
            .command("exporter", ["{secret}"])
            .build();
        let err = ctx().expand_args(&spec).unwrap_err();
        assert!(err.to_string().contains("requires_secret"));
    }

    #[test]
    fn rejects_unknown_and_malformed_placeholders() {
        let spec = execution();
        assert!(ctx().expand(&spec, "{chain}").is_err());
        assert!(ctx().expand(&spec, "{mount:/logs}").is_err());
        assert!(ctx().expand(&spec, "{network").is_err());
        assert!(ctx().expand(&spec, "network}").is_err());
    }
}
