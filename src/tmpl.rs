//! Template engine for names, paths, URLs, headers and skip predicates.
//!
//! Templates use handlebars syntax in strict mode: referencing an undefined field
//! (including a missing `Env.NAME`) is an error rather than an empty string.
//! Output is never HTML-escaped.
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `ProjectName` | configured project name |
//! | `Version`, `RawVersion` | version without the `v` prefix |
//! | `Tag` | release tag |
//! | `Major`, `Minor`, `Patch`, `Prerelease` | semver parts, when the version parses |
//! | `Commit`, `FullCommit`, `ShortCommit`, `Branch` | git metadata |
//! | `Date`, `Timestamp` | invocation time |
//! | `IsSnapshot` | snapshot release flag |
//! | `Env.NAME` | environment lookup |
//! | `Os`, `Arch`, `ArtifactName`, `ArtifactPath`, `ArtifactExt`, `ArtifactID` | per-artifact |
//!
//! Helpers: `eq`, `ne`, `and`, `or`, `not` (built in), `env_or "NAME" "default"`,
//! `tolower`, `toupper`, `trimprefix`, `trimsuffix`, `replace`.

use crate::artifact::Artifact;
use crate::context::Context;
use crate::error::{Result, TemplateError};
use handlebars::{
    Context as HbContext, Handlebars, Helper, HelperResult, Output, RenderContext,
    RenderErrorReason,
};
use serde_json::{Map, Value, json};

mod helpers {
    use handlebars::handlebars_helper;

    handlebars_helper!(tolower: |s: str| s.to_lowercase());
    handlebars_helper!(toupper: |s: str| s.to_uppercase());
    handlebars_helper!(trimprefix: |s: str, prefix: str| s.strip_prefix(prefix).unwrap_or(s).to_string());
    handlebars_helper!(trimsuffix: |s: str, suffix: str| s.strip_suffix(suffix).unwrap_or(s).to_string());
    handlebars_helper!(replace: |s: str, from: str, to: str| s.replace(from, to));
}

/// `{{ env_or "NAME" "default" }}`: environment lookup with a fallback
fn env_or<'reg, 'rc>(
    h: &Helper<'rc>,
    _: &'reg Handlebars<'reg>,
    ctx: &'rc HbContext,
    _: &mut RenderContext<'reg, 'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    let name = h
        .param(0)
        .and_then(|p| p.value().as_str())
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("env_or", 0))?;
    let fallback = h.param(1).and_then(|p| p.value().as_str()).unwrap_or("");
    let value = ctx
        .data()
        .get("Env")
        .and_then(|env| env.get(name))
        .and_then(Value::as_str)
        .unwrap_or(fallback);
    out.write(value)?;
    Ok(())
}

/// Template resolver bound to a release context
pub struct Template<'a> {
    registry: Handlebars<'a>,
    data: Map<String, Value>,
}

impl std::fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template").field("data", &self.data).finish()
    }
}

impl<'a> Template<'a> {
    /// Create a resolver exposing the context's fields
    pub fn new(ctx: &Context) -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("env_or", Box::new(env_or));
        registry.register_helper("tolower", Box::new(helpers::tolower));
        registry.register_helper("toupper", Box::new(helpers::toupper));
        registry.register_helper("trimprefix", Box::new(helpers::trimprefix));
        registry.register_helper("trimsuffix", Box::new(helpers::trimsuffix));
        registry.register_helper("replace", Box::new(helpers::replace));

        let mut data = Map::new();
        data.insert("ProjectName".into(), json!(ctx.config.project_name));
        data.insert("Version".into(), json!(ctx.version));
        data.insert("RawVersion".into(), json!(ctx.version));
        data.insert("Tag".into(), json!(ctx.tag));
        data.insert("Commit".into(), json!(ctx.git.full_commit));
        data.insert("FullCommit".into(), json!(ctx.git.full_commit));
        data.insert("ShortCommit".into(), json!(ctx.git.short_commit));
        data.insert("Branch".into(), json!(ctx.git.branch));
        data.insert("Date".into(), json!(ctx.date.to_rfc3339()));
        data.insert("Timestamp".into(), json!(ctx.date.timestamp()));
        data.insert("IsSnapshot".into(), json!(ctx.snapshot));
        data.insert("Env".into(), json!(ctx.env.as_map()));
        if let Ok(version) = semver::Version::parse(&ctx.version) {
            data.insert("Major".into(), json!(version.major));
            data.insert("Minor".into(), json!(version.minor));
            data.insert("Patch".into(), json!(version.patch));
            data.insert("Prerelease".into(), json!(version.pre.as_str()));
        }

        Self { registry, data }
    }

    /// Expose per-artifact fields
    pub fn with_artifact(mut self, artifact: &Artifact) -> Self {
        self.data.insert("ArtifactName".into(), json!(artifact.name));
        self.data.insert(
            "ArtifactPath".into(),
            json!(artifact.path.to_string_lossy()),
        );
        self.data
            .insert("ArtifactExt".into(), json!(artifact.ext().unwrap_or_default()));
        self.data
            .insert("ArtifactID".into(), json!(artifact.id().unwrap_or_default()));
        self.data
            .insert("Os".into(), json!(artifact.goos.as_deref().unwrap_or_default()));
        self.data
            .insert("Arch".into(), json!(artifact.goarch.as_deref().unwrap_or_default()));
        self
    }

    /// Expose additional fields
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Resolve a template to a literal string
    pub fn apply(&self, template: &str) -> Result<String> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        self.registry
            .render_template(template, &self.data)
            .map_err(|e| {
                let reason = e.to_string();
                if matches!(e.reason(), RenderErrorReason::TemplateError(_)) {
                    TemplateError::Parse {
                        template: template.to_string(),
                        reason,
                    }
                } else {
                    TemplateError::Render {
                        template: template.to_string(),
                        reason,
                    }
                }
                .into()
            })
    }

    /// Resolve every template in order
    pub fn apply_all<'t, I>(&self, templates: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'t str>,
    {
        templates.into_iter().map(|t| self.apply(t)).collect()
    }

    /// Resolve a template to a boolean: `true` (trimmed) is true, anything else false
    pub fn apply_bool(&self, template: &str) -> Result<bool> {
        if template.trim().is_empty() {
            return Ok(false);
        }
        Ok(self.apply(template)?.trim() == "true")
    }
}
