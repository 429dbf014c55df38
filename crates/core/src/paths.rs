use std::path::PathBuf;

/// Profile name for the invisible sub-agent session.
pub const AGENT_PROFILE: &str = "agent";

/// Profile name for interactively driven sessions. Kept separate from
/// [`AGENT_PROFILE`] so the two never open the same user-data dir.
pub const INTERACTIVE_PROFILE: &str = "interactive";

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".webpilot"))
            .unwrap_or_else(|| PathBuf::from(".webpilot"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.base.join("profiles")
    }

    /// User-data dir for one named session. The same name always yields the
    /// same path, which is what keeps cookies across headless/visible
    /// relaunches.
    pub fn profile_dir(&self, name: &str) -> PathBuf {
        let safe_name = name.replace([':', '/', '\\'], "_");
        self.profiles_dir().join(safe_name)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.base.join("media")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_dir_is_stable() {
        let paths = Paths::with_base(PathBuf::from("/tmp/wp"));
        assert_eq!(paths.profile_dir("agent"), paths.profile_dir("agent"));
        assert_ne!(
            paths.profile_dir(AGENT_PROFILE),
            paths.profile_dir(INTERACTIVE_PROFILE)
        );
    }

    #[test]
    fn test_profile_dir_sanitizes_separators() {
        let paths = Paths::with_base(PathBuf::from("/tmp/wp"));
        let dir = paths.profile_dir("cli:default");
        assert!(dir.ends_with("cli_default"));
    }
}
