//! Template registry backed by minijinja

use crate::config::TemplatesConfig;
use crate::error::{MailError, Result};
use crate::mime::RenderedTemplate;
use crate::templates::store::TemplateStore;
use crate::templates::types::{Section, TemplateBundle};
use minijinja::{Environment, UndefinedBehavior};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Bundles compiled into the binary
const EMBEDDED_BUNDLES: &[(&str, &str)] = &[
    (
        "user_welcome",
        include_str!("../../templates/user_welcome.toml"),
    ),
    (
        "token_activation",
        include_str!("../../templates/token_activation.toml"),
    ),
    (
        "token_password_reset",
        include_str!("../../templates/token_password_reset.toml"),
    ),
];

/// Parsed template bundles, loaded once and read-only afterwards
///
/// Referencing a field the payload does not have is a render error, not an
/// empty string.
#[derive(Debug)]
pub struct TemplateRegistry {
    env: Environment<'static>,
    bundles: BTreeSet<String>,
}

impl TemplateRegistry {
    fn empty() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        Self {
            env,
            bundles: BTreeSet::new(),
        }
    }

    /// Load the bundles shipped with the crate
    pub fn embedded() -> Result<Self> {
        Self::from_sources(EMBEDDED_BUNDLES.iter().copied())
    }

    /// Load `config.dir` when set, the built-in bundles otherwise
    pub fn from_config(config: &TemplatesConfig) -> Result<Self> {
        match &config.dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::embedded(),
        }
    }

    /// Load bundles from TOML sources keyed by bundle name
    pub fn from_sources<'a, I>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let bundles = sources
            .into_iter()
            .map(|(name, source)| Ok((name.to_string(), parse_bundle(name, source)?)))
            .collect::<Result<Vec<_>>>()?;

        Self::from_bundles(bundles)
    }

    /// Load every `*.toml` file in `dir`; the file stem is the bundle name
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading templates from {:?}", dir);

        let entries = std::fs::read_dir(dir).map_err(|e| {
            MailError::TemplateLoad(format!("Failed to read {:?}: {}", dir, e))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| MailError::TemplateLoad(format!("Failed to read {:?}: {}", dir, e)))?
                .path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(MailError::TemplateLoad(format!(
                "No template bundles found in {:?}",
                dir
            )));
        }

        let mut bundles = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    MailError::TemplateLoad(format!("Invalid template file name: {:?}", path))
                })?
                .to_string();

            let source = std::fs::read_to_string(&path).map_err(|e| {
                MailError::TemplateLoad(format!("Failed to read {:?}: {}", path, e))
            })?;

            let bundle = parse_bundle(&name, &source)?;
            bundles.push((name, bundle));
        }

        Self::from_bundles(bundles)
    }

    /// Register already-parsed bundles
    pub fn from_bundles<I>(bundles: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, TemplateBundle)>,
    {
        let mut registry = Self::empty();

        for (name, bundle) in bundles {
            registry.add_bundle(name, bundle)?;
        }

        info!("Loaded {} template bundle(s)", registry.bundles.len());
        Ok(registry)
    }

    fn add_bundle(&mut self, name: String, bundle: TemplateBundle) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(MailError::TemplateLoad(format!(
                "Invalid bundle name: {:?}",
                name
            )));
        }

        if self.bundles.contains(&name) {
            return Err(MailError::TemplateLoad(format!(
                "Duplicate bundle: {}",
                name
            )));
        }

        for section in Section::ALL {
            if let Some(source) = bundle.section(section) {
                self.env
                    .add_template_owned(section.template_key(&name), source.to_string())
                    .map_err(|e| {
                        MailError::TemplateLoad(format!("{}/{}: {}", name, section, e))
                    })?;
            }
        }

        debug!("Registered template bundle {}", name);
        self.bundles.insert(name);
        Ok(())
    }

    fn render_section(
        &self,
        name: &str,
        section: Section,
        payload: &serde_json::Value,
    ) -> Result<String> {
        let template = self
            .env
            .get_template(&section.template_key(name))
            .map_err(|_| MailError::TemplateRender {
                template: name.to_string(),
                message: format!("section '{}' is not defined", section),
            })?;

        let rendered = template.render(payload).map_err(|e| MailError::TemplateRender {
            template: name.to_string(),
            message: format!("{}: {}", section, e),
        })?;

        Ok(rendered.trim().to_string())
    }
}

impl TemplateStore for TemplateRegistry {
    fn render(&self, name: &str, payload: &serde_json::Value) -> Result<RenderedTemplate> {
        if !self.bundles.contains(name) {
            return Err(MailError::TemplateNotFound(name.to_string()));
        }

        Ok(RenderedTemplate {
            subject: self.render_section(name, Section::Subject, payload)?,
            plain_body: self.render_section(name, Section::PlainBody, payload)?,
            html_body: self.render_section(name, Section::HtmlBody, payload)?,
        })
    }

    fn contains(&self, name: &str) -> bool {
        self.bundles.contains(name)
    }

    fn names(&self) -> Vec<String> {
        self.bundles.iter().cloned().collect()
    }
}

fn parse_bundle(name: &str, source: &str) -> Result<TemplateBundle> {
    toml::from_str(source)
        .map_err(|e| MailError::TemplateLoad(format!("{}: {}", name, e)))
}
