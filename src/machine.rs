use std::collections::HashSet;

/// A machine found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineRef {
    pub name: String,
    pub url: String,
}

impl MachineRef {
    /// Builds a reference from a catalog URL of the form `...?vm=<name>`.
    pub fn from_catalog_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = match url.rsplit_once("vm=") {
            Some((_, name)) => name.to_string(),
            None => "unknown".to_string(),
        };
        Self { name, url }
    }
}

/// Case-insensitive set of machine names that end a crawl.
#[derive(Debug, Clone, Default)]
pub struct StopRule {
    names: HashSet<String>,
}

impl StopRule {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.names.contains(&name.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
