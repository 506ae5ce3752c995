//! Placeholder templating for unit files and config artifacts
//!
//! Templates carry `__TOKEN__` placeholders. Rendering is strict: an
//! unresolved token left in the output is an error, not a silent pass-through.

use anyhow::{bail, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__[A-Z][A-Z0-9_]*__").expect("valid placeholder regex"));

static USER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("valid user regex"));

/// Host values substituted into templates
#[derive(Debug, Clone)]
pub struct TemplateParams {
    pub user: String,
    pub home: PathBuf,
    pub project_dir: PathBuf,
    /// Installed location of this binary
    pub bin: PathBuf,
}

impl TemplateParams {
    pub fn validate(&self) -> Result<()> {
        if !USER_NAME.is_match(&self.user) {
            bail!("Invalid user name for templates: {:?}", self.user);
        }
        for (name, path) in [
            ("home", &self.home),
            ("project directory", &self.project_dir),
            ("binary", &self.bin),
        ] {
            if !path.is_absolute() {
                bail!("Template {} must be an absolute path: {}", name, path.display());
            }
        }
        Ok(())
    }

    fn substitutions(&self) -> [(&'static str, String); 4] {
        [
            ("__USER__", self.user.clone()),
            ("__HOME__", self.home.display().to_string()),
            ("__PROJECT_DIR__", self.project_dir.display().to_string()),
            ("__BIN__", self.bin.display().to_string()),
        ]
    }
}

/// A named template body
#[derive(Debug, Clone)]
pub struct Template<'a> {
    pub name: &'a str,
    pub body: &'a str,
}

impl<'a> Template<'a> {
    pub const fn new(name: &'a str, body: &'a str) -> Self {
        Self { name, body }
    }

    pub fn render(&self, params: &TemplateParams) -> Result<String> {
        params.validate()?;

        let mut out = self.body.to_string();
        for (token, value) in params.substitutions() {
            out = out.replace(token, &value);
        }

        if let Some(left) = PLACEHOLDER.find(&out) {
            bail!("Template {} has unresolved placeholder {}", self.name, left.as_str());
        }
        Ok(out)
    }

    /// Render a systemd unit and check it has the sections systemd requires
    pub fn render_unit(&self, params: &TemplateParams) -> Result<String> {
        let unit = self.render(params)?;
        for section in ["[Unit]", "[Service]"] {
            if !unit.lines().any(|l| l.trim() == section) {
                bail!("Unit template {} is missing its {} section", self.name, section);
            }
        }
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TemplateParams {
        TemplateParams {
            user: "pi".to_string(),
            home: PathBuf::from("/home/pi"),
            project_dir: PathBuf::from("/home/pi/loop"),
            bin: PathBuf::from("/usr/local/bin/loop-setup"),
        }
    }

    #[test]
    fn test_render_substitutes_all_tokens() {
        let t = Template::new(
            "t",
            "User=__USER__\nWorkingDirectory=__PROJECT_DIR__/backend\nEnv=HOME=__HOME__\nExec=__BIN__ x\n",
        );
        let out = t.render(&params()).unwrap();
        assert_eq!(
            out,
            "User=pi\nWorkingDirectory=/home/pi/loop/backend\nEnv=HOME=/home/pi\nExec=/usr/local/bin/loop-setup x\n"
        );
    }

    #[test]
    fn test_unknown_placeholder_is_rejected() {
        let t = Template::new("t", "Group=__GROUP__\n");
        let err = t.render(&params()).unwrap_err();
        assert!(err.to_string().contains("__GROUP__"));
    }

    #[test]
    fn test_plain_double_underscores_are_not_placeholders() {
        let t = Template::new("t", "ExecStart=python -m __main__\n");
        assert!(t.render(&params()).is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let mut p = params();
        p.user = "Pi User".to_string();
        assert!(Template::new("t", "").render(&p).is_err());

        let mut p = params();
        p.project_dir = PathBuf::from("loop");
        assert!(Template::new("t", "").render(&p).is_err());
    }

    #[test]
    fn test_render_unit_requires_sections() {
        let ok = Template::new("ok.service", "[Unit]\nDescription=x\n\n[Service]\nUser=__USER__\n");
        assert!(ok.render_unit(&params()).is_ok());

        let bad = Template::new("bad.service", "[Unit]\nDescription=x\n");
        let err = bad.render_unit(&params()).unwrap_err();
        assert!(err.to_string().contains("[Service]"));
    }
}
