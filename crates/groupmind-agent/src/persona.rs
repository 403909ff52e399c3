//! Persona Loader: identity, addressing-trigger patterns, admin roster,
//! and response templates, loaded from disk once at startup.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use groupmind_core::error::{GroupmindError, Result};

fn placeholder_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").unwrap())
}

/// Raw structure of the persona TOML file — identity, addressing, and the
/// admin roster. Distinct from `groupmind_core::config::PersonaConfig`,
/// which only carries the *path* to this file.
#[derive(Debug, Clone, Deserialize)]
struct PersonaFile {
    bot_handle: String,
    #[serde(default)]
    trigger_patterns: Vec<String>,
    #[serde(default)]
    admin_user_ids: Vec<i64>,
}

pub struct Persona {
    pub bot_handle: String,
    trigger_regexes: Vec<Regex>,
    admin_user_ids: Vec<i64>,
    system_prompt_template: String,
    templates: HashMap<String, String>,
}

impl Persona {
    /// Load identity/triggers/admins from `persona_path` (TOML), the
    /// system prompt body from `system_prompt_path` (plain text), and
    /// response templates from `templates_path` (a `name = "text"` TOML
    /// table). Validates every placeholder in every loaded text at load
    /// time: well-formed `{identifier}` syntax, balanced braces.
    pub fn load(persona_path: &str, system_prompt_path: &str, templates_path: &str) -> Result<Self> {
        let persona_raw = std::fs::read_to_string(persona_path)?;
        let persona_file: PersonaFile = toml_basic::parse(&persona_raw)
            .map_err(|e| GroupmindError::Validation(format!("invalid persona file: {e}")))?;

        let trigger_regexes = persona_file
            .trigger_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    GroupmindError::Validation(format!("invalid trigger pattern {p:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let system_prompt_template = std::fs::read_to_string(system_prompt_path)?;
        validate_placeholders(&system_prompt_template)?;

        let templates_raw = std::fs::read_to_string(templates_path)?;
        let templates: HashMap<String, String> = toml_basic::parse_table(&templates_raw)
            .map_err(|e| GroupmindError::Validation(format!("invalid templates file: {e}")))?;
        for (name, text) in &templates {
            validate_placeholders(text)
                .map_err(|e| GroupmindError::Validation(format!("template {name:?}: {e}")))?;
        }

        Ok(Self {
            bot_handle: persona_file.bot_handle,
            trigger_regexes,
            admin_user_ids: persona_file.admin_user_ids,
            system_prompt_template,
            templates,
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_user_ids.contains(&user_id)
    }

    /// Whether `text` matches any configured trigger pattern (addressing
    /// by content, independent of reply-to or @mention checks).
    pub fn matches_trigger(&self, text: &str) -> bool {
        self.trigger_regexes.iter().any(|re| re.is_match(text))
    }

    pub fn mentions_handle(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.bot_handle.to_lowercase())
    }

    /// Render the system prompt, substituting `{timestamp}`,
    /// `{current_year}`, `{current_date}`, and any caller-supplied
    /// `vars`. Unmatched placeholders are logged and left verbatim.
    pub fn get_system_prompt(&self, now_unix: i64, vars: &[(&str, &str)]) -> String {
        let mut all_vars: HashMap<&str, String> = HashMap::new();
        let datetime = chrono::DateTime::from_timestamp(now_unix, 0).unwrap_or_default();
        all_vars.insert("timestamp", now_unix.to_string());
        all_vars.insert("current_year", datetime.format("%Y").to_string());
        all_vars.insert("current_date", datetime.format("%Y-%m-%d").to_string());
        for (k, v) in vars {
            all_vars.insert(k, v.to_string());
        }
        substitute(&self.system_prompt_template, &all_vars)
    }

    pub fn get_template(&self, name: &str, vars: &[(&str, &str)]) -> Option<String> {
        let template = self.templates.get(name)?;
        let map: HashMap<&str, String> = vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        Some(substitute(template, &map))
    }
}

fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match vars.get(name) {
                Some(value) => value.clone(),
                None => {
                    warn!(placeholder = name, "unmatched template placeholder, left verbatim");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Validates that every `{...}` in `text` is a well-formed
/// `{[a-zA-Z_][a-zA-Z0-9_]*}` placeholder and that braces are balanced.
fn validate_placeholders(text: &str) -> Result<()> {
    let mut depth = 0i32;
    for ch in text.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(GroupmindError::Validation("unbalanced closing brace".to_string()));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(GroupmindError::Validation("unbalanced opening brace".to_string()));
    }

    for caps in Regex::new(r"\{[^{}]*\}").unwrap().captures_iter(text) {
        let inner = &caps[0];
        if !placeholder_pattern().is_match(inner) {
            return Err(GroupmindError::Validation(format!(
                "malformed placeholder: {inner}"
            )));
        }
    }
    Ok(())
}

/// A deliberately small TOML reader covering exactly the shapes the
/// persona and template files use (flat keys, string arrays, a flat
/// string table) — not a general-purpose parser.
mod toml_basic {
    use std::collections::HashMap;

    pub fn parse(raw: &str) -> Result<super::PersonaFile, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }

    pub fn parse_table(raw: &str) -> Result<HashMap<String, String>, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn sample_persona() -> (tempfile::NamedTempFile, tempfile::NamedTempFile, tempfile::NamedTempFile) {
        let persona = write_temp(
            r#"
bot_handle = "@groupmind_bot"
trigger_patterns = ["(?i)\\bhey bot\\b"]
admin_user_ids = [42]
"#,
        );
        let prompt = write_temp("You are a helpful bot. Today is {current_date}.");
        let templates = write_temp(r#"banned = "You are banned from this chat, {name}.""#);
        (persona, prompt, templates)
    }

    #[test]
    fn loads_and_renders_system_prompt() {
        let (persona, prompt, templates) = sample_persona();
        let p = Persona::load(
            persona.path().to_str().unwrap(),
            prompt.path().to_str().unwrap(),
            templates.path().to_str().unwrap(),
        )
        .unwrap();
        let rendered = p.get_system_prompt(1_700_000_000, &[]);
        assert!(rendered.contains("2023-11-14"));
        assert!(p.is_admin(42));
        assert!(!p.is_admin(1));
    }

    #[test]
    fn matches_trigger_pattern() {
        let (persona, prompt, templates) = sample_persona();
        let p = Persona::load(
            persona.path().to_str().unwrap(),
            prompt.path().to_str().unwrap(),
            templates.path().to_str().unwrap(),
        )
        .unwrap();
        assert!(p.matches_trigger("Hey bot, what's up?"));
        assert!(!p.matches_trigger("just chatting with friends"));
    }

    #[test]
    fn template_substitution_fills_known_vars() {
        let (persona, prompt, templates) = sample_persona();
        let p = Persona::load(
            persona.path().to_str().unwrap(),
            prompt.path().to_str().unwrap(),
            templates.path().to_str().unwrap(),
        )
        .unwrap();
        let rendered = p.get_template("banned", &[("name", "Alice")]).unwrap();
        assert_eq!(rendered, "You are banned from this chat, Alice.");
    }

    #[test]
    fn unbalanced_braces_are_rejected_at_load() {
        let err = validate_placeholders("hello {name").unwrap_err();
        assert!(matches!(err, GroupmindError::Validation(_)));
    }

    #[test]
    fn malformed_placeholder_is_rejected() {
        let err = validate_placeholders("hello {123bad}").unwrap_err();
        assert!(matches!(err, GroupmindError::Validation(_)));
    }

    #[test]
    fn unmatched_placeholder_is_left_verbatim() {
        let rendered = substitute("hi {unknown_var}", &HashMap::new());
        assert_eq!(rendered, "hi {unknown_var}");
    }
}
