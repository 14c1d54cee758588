//! Upload target validation and credential resolution.

use super::client;
use crate::config::{MODE_ARCHIVE, MODE_BINARY, Upload};
use crate::context::Context;
use crate::error::{ConfigError, Result};

/// Environment variable name `<KIND>_<NAME>_<SUFFIX>`, uppercased
pub fn env_key(kind: &str, name: &str, suffix: &str) -> String {
    format!("{kind}_{name}_{suffix}").to_uppercase()
}

/// Username from configuration, falling back to `<KIND>_<NAME>_USERNAME`
pub fn resolve_username(ctx: &Context, upload: &Upload, kind: &str) -> Option<String> {
    if !upload.username.is_empty() {
        return Some(upload.username.clone());
    }
    ctx.env
        .get(&env_key(kind, &upload.name, "USERNAME"))
        .map(str::to_string)
}

/// Secret from `<KIND>_<NAME>_SECRET`, never from configuration
pub fn resolve_secret(ctx: &Context, upload: &Upload, kind: &str) -> Option<String> {
    ctx.env
        .get(&env_key(kind, &upload.name, "SECRET"))
        .map(str::to_string)
}

/// Validate an upload target before any network or file activity
pub fn check_config(ctx: &Context, upload: &Upload, kind: &str) -> Result<()> {
    let missing = |field: &str| ConfigError::MissingField {
        section: kind.to_string(),
        name: upload.name.clone(),
        field: field.to_string(),
    };

    if upload.name.is_empty() {
        return Err(missing("name").into());
    }
    if upload.target.is_empty() {
        return Err(missing("target").into());
    }
    match upload.mode.as_str() {
        "" => return Err(missing("mode").into()),
        MODE_ARCHIVE | MODE_BINARY => {}
        other => {
            return Err(ConfigError::InvalidValue {
                section: kind.to_string(),
                name: upload.name.clone(),
                field: "mode".to_string(),
                value: other.to_string(),
                expected: format!("{MODE_ARCHIVE} or {MODE_BINARY}"),
            }
            .into());
        }
    }
    if !upload.method.is_empty() && reqwest::Method::from_bytes(upload.method.as_bytes()).is_err()
    {
        return Err(ConfigError::InvalidValue {
            section: kind.to_string(),
            name: upload.name.clone(),
            field: "method".to_string(),
            value: upload.method.clone(),
            expected: "an HTTP method".to_string(),
        }
        .into());
    }

    if !upload.trusted_certificates.is_empty() {
        client::parse_trusted_certificates(&upload.name, &upload.trusted_certificates)?;
    }
    if upload.client_x509_cert.is_empty() != upload.client_x509_key.is_empty() {
        return Err(ConfigError::Misconfigured {
            section: kind.to_string(),
            name: upload.name.clone(),
            reason: "client_x509_cert and client_x509_key must be set together".to_string(),
        }
        .into());
    }

    let secret_key = env_key(kind, &upload.name, "SECRET");
    let has_secret = ctx.env.contains(&secret_key);
    if !upload.username.is_empty() && !has_secret {
        return Err(ConfigError::MissingSecret {
            section: kind.to_string(),
            name: upload.name.clone(),
            key: secret_key,
        }
        .into());
    }
    if has_secret && resolve_username(ctx, upload, kind).is_none() {
        return Err(ConfigError::Misconfigured {
            section: kind.to_string(),
            name: upload.name.clone(),
            reason: format!(
                "missing username: set username or {}",
                env_key(kind, &upload.name, "USERNAME")
            ),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Project;
    use crate::error::ReleaseError;

    fn ctx(env: &[(&str, &str)]) -> Context {
        Context::with_env(Project::default(), env.iter().copied().collect()).unwrap()
    }

    fn valid() -> Upload {
        Upload {
            name: "a".into(),
            target: "http://blabla".into(),
            username: "pepe".into(),
            mode: MODE_ARCHIVE.into(),
            ..Default::default()
        }
    }

    #[test]
    fn env_keys_are_uppercased() {
        assert_eq!(env_key("test", "prod-a", "SECRET"), "TEST_PROD-A_SECRET");
    }

    #[test]
    fn table() {
        let with_secret = [("TEST_A_SECRET", "x")];
        let cases: Vec<(&str, Upload, &[(&str, &str)], bool)> = vec![
            ("ok", valid(), &with_secret, true),
            ("secret missing", valid(), &[], false),
            ("target missing", Upload { target: String::new(), ..valid() }, &with_secret, false),
            ("name missing", Upload { name: String::new(), ..valid() }, &with_secret, false),
            ("mode missing", Upload { mode: String::new(), ..valid() }, &with_secret, false),
            ("mode invalid", Upload { mode: "blabla".into(), ..valid() }, &with_secret, false),
            (
                "bad cert",
                Upload { trusted_certificates: "bad cert!".into(), ..valid() },
                &with_secret,
                false,
            ),
            ("username missing", Upload { username: String::new(), ..valid() }, &with_secret, false),
            ("username from env", Upload { username: String::new(), ..valid() },
                &[("TEST_A_SECRET", "x"), ("TEST_A_USERNAME", "env-user")], true),
            ("no secret no username", Upload { username: String::new(), ..valid() }, &[], true),
            ("method invalid", Upload { method: "NOT A METHOD".into(), ..valid() }, &with_secret, false),
            (
                "half client identity",
                Upload { client_x509_cert: "cert.pem".into(), ..valid() },
                &with_secret,
                false,
            ),
        ];

        for (name, upload, env, ok) in cases {
            let result = check_config(&ctx(env), &upload, "test");
            assert_eq!(result.is_ok(), ok, "{name}: {result:?}");
            if let Err(err) = result {
                assert!(!err.is_skip(), "{name}");
                assert!(
                    matches!(err, ReleaseError::Config(_) | ReleaseError::Upload(_)),
                    "{name}: {err:?}"
                );
            }
        }
    }

    #[test]
    fn configured_username_requires_secret_variable() {
        let err = check_config(&ctx(&[]), &valid(), "test").unwrap_err();
        assert!(
            matches!(err, ReleaseError::Config(ConfigError::MissingSecret { ref key, .. }) if key == "TEST_A_SECRET"),
            "{err:?}"
        );
    }

    #[test]
    fn username_resolution_prefers_config() {
        let ctx = ctx(&[("TEST_A_USERNAME", "env-user")]);
        assert_eq!(resolve_username(&ctx, &valid(), "test").as_deref(), Some("pepe"));
        let anonymous = Upload { username: String::new(), ..valid() };
        assert_eq!(resolve_username(&ctx, &anonymous, "test").as_deref(), Some("env-user"));
        assert_eq!(resolve_username(&ctx, &anonymous, "other"), None);
    }
}
