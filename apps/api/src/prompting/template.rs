use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Variable values keyed by name. Ordered so serialization is canonical.
pub type Variables = BTreeMap<String, String>;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"))
}

/// Unique placeholder names in order of first appearance.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder().captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Substitutes `{name}` with its value. Placeholders without a value stay verbatim.
pub fn render_template(template: &str, variables: &Variables) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Aligns a variable map with the placeholders currently in `template`:
/// stale keys are dropped, new placeholders get an empty value.
pub fn reconcile_variables(template: &str, variables: &Variables) -> Variables {
    extract_variables(template)
        .into_iter()
        .map(|name| {
            let value = variables.get(&name).cloned().unwrap_or_default();
            (name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extract_unique_in_order() {
        let names = extract_variables("Hi {name}, meet {friend}. Bye {name}! {not-a-var}");
        assert_eq!(names, vec!["name", "friend"]);
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let out = render_template("{greeting}, {name}!", &vars(&[("greeting", "Hello")]));
        assert_eq!(out, "Hello, {name}!");
    }

    #[test]
    fn test_render_does_not_reexpand_values() {
        let out = render_template("{a}", &vars(&[("a", "{b}"), ("b", "x")]));
        assert_eq!(out, "{b}");
    }

    #[test]
    fn test_reconcile_drops_and_adds() {
        let current = vars(&[("old", "1"), ("kept", "2")]);
        let reconciled = reconcile_variables("{kept} and {fresh}", &current);
        assert_eq!(reconciled, vars(&[("kept", "2"), ("fresh", "")]));
    }
}
