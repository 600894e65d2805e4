/// One invocation of the scoreboard's `plugins.py` management script.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PluginOperation {
    List,
    Add { url: String },
    Remove { name: String, keep_config: bool },
    Update { name: String },
    Sync,
}

impl PluginOperation {
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Add { .. } => "add",
            Self::Remove { .. } => "rm",
            Self::Update { .. } => "update",
            Self::Sync => "sync",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::List)
    }

    pub fn args(&self) -> Vec<String> {
        let mut out = vec![self.verb().to_string()];
        match self {
            Self::List | Self::Sync => {}
            Self::Add { url } => out.push(url.clone()),
            Self::Remove { name, keep_config } => {
                out.push(name.clone());
                if *keep_config {
                    out.push("--keep-config".to_string());
                }
            }
            Self::Update { name } => out.push(name.clone()),
        }
        out
    }

    /// Returns the name of the required field that is blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        match self {
            Self::Add { url } if url.trim().is_empty() => Some("url"),
            Self::Remove { name, .. } | Self::Update { name } if name.trim().is_empty() => {
                Some("name")
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for PluginOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_appends_keep_config_only_when_requested() {
        let plain = PluginOperation::Remove {
            name: "weather_plus".to_string(),
            keep_config: false,
        };
        assert_eq!(plain.args(), vec!["rm", "weather_plus"]);

        let keep = PluginOperation::Remove {
            name: "weather_plus".to_string(),
            keep_config: true,
        };
        assert_eq!(keep.args(), vec!["rm", "weather_plus", "--keep-config"]);
    }

    #[test]
    fn blank_required_fields_are_detected() {
        assert_eq!(
            PluginOperation::Add { url: " ".to_string() }.missing_field(),
            Some("url")
        );
        assert_eq!(
            PluginOperation::Update {
                name: String::new()
            }
            .missing_field(),
            Some("name")
        );
        assert_eq!(PluginOperation::Sync.missing_field(), None);
        assert!(!PluginOperation::List.is_mutating());
    }
}
