//! Rendering of BIND configuration artifacts from Jinja templates.
//!
//! Each artifact is rendered from a `<name>.j2` template and written to `<dir>/<name>`.

use crate::error::Error;
use minijinja::{path_loader, Environment};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const MAIN_ZONE_TEMPLATE: &str = "main-zone.j2";
pub const USER_ZONE_TEMPLATE: &str = "user-zone.j2";
pub const NAMED_CONF_TEMPLATE: &str = "named.conf.j2";
pub const NAMED_CONF_LOCAL_TEMPLATE: &str = "named.conf.local.j2";
pub const NAMED_CONF_RNDC_TEMPLATE: &str = "named.conf.rndc.j2";
pub const RNDC_CONF_TEMPLATE: &str = "rndc.conf.j2";

const TEMPLATE_EXTENSION: &str = "j2";

/// Everything a template may refer to. Fields a given artifact doesn't need are left at their
/// defaults.
#[derive(Serialize, Debug, Clone, Default)]
pub struct TemplateData {
    pub origin: String,
    pub root_origin: String,
    pub ns_ip: Option<String>,
    pub user_list: Vec<String>,
    pub custom_records: String,
    pub serial: u32,
    pub bind_dir: String,
    pub user_zones_dir: String,
    pub rndc_secret: Option<String>,
}

pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    #[must_use]
    pub fn new(templates_dir: impl AsRef<Path>) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(templates_dir.as_ref()));
        Self { env }
    }

    /// Render the named template with `data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if the template is missing or rendering fails.
    pub fn render(&self, template: &str, data: &impl Serialize) -> Result<String, Error> {
        let template = self.env.get_template(template)?;
        Ok(template.render(data)?)
    }

    /// Render the named template and write it to `dir`, named after the template minus its
    /// `.j2` extension. Returns the path written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] on rendering failures and [`Error::IO`] if the output can't
    /// be written.
    pub async fn write(
        &self,
        template: &str,
        dir: impl AsRef<Path>,
        data: &impl Serialize,
    ) -> Result<PathBuf, Error> {
        let path = Path::new(template);
        if path.extension().and_then(|ext| ext.to_str()) != Some(TEMPLATE_EXTENSION) {
            tracing::error!("template file should have .{TEMPLATE_EXTENSION} extension: {template}");
        }
        let name = path.file_stem().unwrap_or(path.as_os_str());
        let rendered = self.render(template, data)?;
        let output = dir.as_ref().join(name);
        tokio::fs::write(&output, rendered).await?;
        Ok(output)
    }
}

#[cfg(test)]
pub(crate) fn shipped() -> TemplateRenderer {
    TemplateRenderer::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/bind"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> TemplateData {
        TemplateData {
            origin: "example.com.".to_string(),
            root_origin: "example.com.".to_string(),
            ns_ip: Some("192.0.2.1".to_string()),
            user_list: vec!["alice".to_string(), "bob".to_string()],
            custom_records: "www IN CNAME example.net.".to_string(),
            serial: 2_026_101_600,
            bind_dir: "/etc/bind".to_string(),
            user_zones_dir: "/etc/bind/user-zones".to_string(),
            rndc_secret: Some("c2VjcmV0".to_string()),
        }
    }

    #[test]
    fn main_zone_delegates_every_user() {
        let zone = shipped().render(MAIN_ZONE_TEMPLATE, &data()).unwrap();
        assert!(zone.contains("$ORIGIN example.com."));
        assert!(zone.contains("192.0.2.1"));
        assert!(zone.contains("alice"));
        assert!(zone.contains("bob"));
        assert!(zone.contains("www IN CNAME example.net."));
        assert!(zone.contains("2026101600"));
    }

    #[test]
    fn local_conf_lists_user_zones() {
        let conf = shipped().render(NAMED_CONF_LOCAL_TEMPLATE, &data()).unwrap();
        assert!(conf.contains(r#"zone "alice.example.com.""#));
        assert!(conf.contains("/etc/bind/user-zones/bob"));
    }

    #[test]
    fn missing_template_is_an_error() {
        assert!(matches!(
            shipped().render("nope.j2", &data()),
            Err(Error::Template(_))
        ));
    }

    #[tokio::test]
    async fn write_strips_extension() {
        let dir = tempfile::tempdir().unwrap();
        let written = shipped()
            .write(RNDC_CONF_TEMPLATE, dir.path(), &data())
            .await
            .unwrap();
        assert_eq!(written, dir.path().join("rndc.conf"));
        let contents = std::fs::read_to_string(written).unwrap();
        assert!(contents.contains("c2VjcmV0"));
    }
}
