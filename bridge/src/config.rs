use anyhow::Context;

pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub base_url: url::Url,
    pub log_file: Option<std::path::PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable is required")?;
        let model = non_empty("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());

        let raw_base = non_empty("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let base_url = url::Url::parse(raw_base.trim_end_matches('/'))
            .with_context(|| format!("invalid OPENAI_BASE_URL: {raw_base}"))?;

        // GO_LOG_FILE is the name older plugin configs still export.
        let log_file = non_empty("HELLO_VIM_LOG_FILE")
            .or_else(|| non_empty("GO_LOG_FILE"))
            .map(std::path::PathBuf::from);

        Ok(Self {
            api_key,
            model,
            base_url,
            log_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn api_key_is_required() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
        assert!(config(&[("OPENAI_API_KEY", "  ")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.base_url.as_str(), DEFAULT_BASE_URL);
        assert!(cfg.log_file.is_none());
    }

    #[test]
    fn overrides_and_legacy_log_variable() {
        let cfg = config(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("OPENAI_BASE_URL", "http://127.0.0.1:8080/v1/"),
            ("GO_LOG_FILE", "/tmp/bridge.log"),
        ])
        .unwrap();
        assert_eq!(cfg.model, "gpt-4o-mini");
        assert_eq!(cfg.base_url.as_str(), "http://127.0.0.1:8080/v1");
        assert_eq!(
            cfg.log_file.as_deref(),
            Some(std::path::Path::new("/tmp/bridge.log"))
        );

        let cfg = config(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("HELLO_VIM_LOG_FILE", "/tmp/new.log"),
            ("GO_LOG_FILE", "/tmp/old.log"),
        ])
        .unwrap();
        assert_eq!(
            cfg.log_file.as_deref(),
            Some(std::path::Path::new("/tmp/new.log"))
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = config(&[("OPENAI_API_KEY", "k"), ("OPENAI_BASE_URL", "not a url")])
            .unwrap_err();
        assert!(err.to_string().contains("OPENAI_BASE_URL"));
    }
}
