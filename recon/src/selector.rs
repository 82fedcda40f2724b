use serde::{Deserialize, Serialize};

/// Represents ways to locate an element in a remote document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Selector {
    /// Raw CSS selector, passed through untouched
    Css(String),
    /// Exact element id
    Id(String),
    /// Element id starting with the given text (PeopleSoft row suffixes like `$0`)
    IdPrefix(String),
    /// Element id containing the given text
    IdContains(String),
    /// Descendant chain, each part searched inside the previous match
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    /// Render as a CSS selector for a DOM `querySelectorAll` call.
    pub fn to_css(&self) -> Result<String, crate::ReconError> {
        match self {
            Selector::Css(css) => Ok(css.clone()),
            Selector::Id(id) => Ok(format!("[id=\"{}\"]", escape_attr(id))),
            Selector::IdPrefix(prefix) => Ok(format!("[id^=\"{}\"]", escape_attr(prefix))),
            Selector::IdContains(part) => Ok(format!("[id*=\"{}\"]", escape_attr(part))),
            Selector::Chain(parts) => {
                let rendered = parts
                    .iter()
                    .map(Selector::to_css)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rendered.join(" "))
            }
            Selector::Invalid(reason) => Err(crate::ReconError::InvalidSelector(reason.clone())),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Selector::Invalid(_) => false,
            Selector::Chain(parts) => !parts.is_empty() && parts.iter().all(Selector::is_valid),
            _ => true,
        }
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "{css}"),
            Selector::Id(id) => write!(f, "id:{id}"),
            Selector::IdPrefix(prefix) => write!(f, "idprefix:{prefix}"),
            Selector::IdContains(part) => write!(f, "idcontains:{part}"),
            Selector::Chain(parts) => {
                let joined: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", joined.join(" >> "))
            }
            Selector::Invalid(reason) => write!(f, "invalid:{reason}"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            if parts.iter().any(|p| p.is_empty()) {
                return Selector::Invalid(format!("Empty segment in selector chain: \"{s}\""));
            }
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        let lower = s.to_lowercase();
        match s {
            "" => Selector::Invalid("Empty selector".to_string()),
            _ if lower.starts_with("idprefix:") => Selector::IdPrefix(s["idprefix:".len()..].to_string()),
            _ if lower.starts_with("idcontains:") => {
                Selector::IdContains(s["idcontains:".len()..].to_string())
            }
            _ if lower.starts_with("id:") => Selector::Id(s[3..].to_string()),
            _ if lower.starts_with("css:") => Selector::Css(s[4..].trim().to_string()),
            _ => Selector::Css(s.to_string()),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}
