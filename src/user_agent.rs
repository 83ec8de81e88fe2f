//! User-Agent presets and selection.
//!
//! `--user-agent` takes either a preset name or a literal header value.

/// Browser presets selectable by name (lowercase).
const BROWSER_PRESETS: &[(&str, &str)] = &[
    (
        "chrome",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.4896.127 Safari/537.36",
    ),
    (
        "chromium",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Ubuntu Chromium/83.0.4103.61 Chrome/83.0.4103.61 Safari/537.36",
    ),
    (
        "firefox",
        "Mozilla/5.0 (Windows NT 10.0; rv:102.0) Gecko/20100101 Firefox/102.0",
    ),
    (
        "safari",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.3 Safari/605.1.15",
    ),
];

/// Name of the preset that identifies the tool itself.
pub const DEFAULT_PRESET: &str = "default";

/// Default User-Agent (identifies the tool and its version).
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("cdownloader/{version}")
}

/// Every recognised preset name.
#[must_use]
pub fn preset_names() -> Vec<&'static str> {
    BROWSER_PRESETS
        .iter()
        .map(|(name, _)| *name)
        .chain(std::iter::once(DEFAULT_PRESET))
        .collect()
}

/// Outcome of resolving a `--user-agent` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentChoice {
    /// A named preset.
    Preset {
        name: &'static str,
        user_agent: String,
    },
    /// A literal header value.
    Custom { user_agent: String },
}

impl UserAgentChoice {
    /// Header value to send.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        match self {
            Self::Preset { user_agent, .. } | Self::Custom { user_agent } => user_agent,
        }
    }

    /// A single-word custom value is most likely a misspelt preset name
    /// rather than a real User-Agent.
    #[must_use]
    pub fn looks_like_mistyped_preset(&self) -> bool {
        match self {
            Self::Preset { .. } => false,
            Self::Custom { user_agent } => !user_agent.trim().contains(' '),
        }
    }
}

/// Resolves `input` to a preset (case-insensitive, whitespace-trimmed) or
/// keeps it verbatim as a custom value.
#[must_use]
pub fn resolve_user_agent(input: &str) -> UserAgentChoice {
    let key = input.trim().to_ascii_lowercase();
    if key == DEFAULT_PRESET {
        return UserAgentChoice::Preset {
            name: DEFAULT_PRESET,
            user_agent: default_user_agent(),
        };
    }
    BROWSER_PRESETS
        .iter()
        .find(|(name, _)| *name == key)
        .map_or_else(
            || UserAgentChoice::Custom {
                user_agent: input.to_string(),
            },
            |&(name, value)| UserAgentChoice::Preset {
                name,
                user_agent: value.to_string(),
            },
        )
}
