//! Drift detection between a golden and a current configuration.
//!
//! Every top-level golden line is classified into one of nine categories by
//! its textual prefix. Line-level categories are checked by exact-line
//! containment in the current configuration; block-level categories compare
//! the whole block (header plus indented body) with the block of the same
//! header in the current configuration.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::normalize::{CanonicalConfig, ConfigBlock, indent_depth};

/// Body lines that make an interface worth diffing. An interface whose body
/// is only `shutdown` is left alone.
pub const CONFIGURED_INTERFACE_MARKERS: [&str; 4] =
    ["ip address", "ip ospf", "description", "switchport"];

/// The configuration classes tracked by the differ and the applier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// `hostname ...`
    Hostname,
    /// `username ...`
    Username,
    /// `ip domain ...`
    IpDomain,
    /// `ip dhcp pool ...` blocks
    Dhcp,
    /// `ip dhcp excluded-address ...`
    DhcpExcluded,
    /// Configured `interface ...` blocks
    Interfaces,
    /// `router ospf ...` blocks
    RouterOspf,
    /// `ip access-list ...` blocks
    AccessList,
    /// `line con` / `line vty` blocks
    Line,
}

impl Category {
    /// All categories, in report order.
    pub const ALL: [Category; 9] = [
        Category::Hostname,
        Category::Username,
        Category::IpDomain,
        Category::Dhcp,
        Category::DhcpExcluded,
        Category::Interfaces,
        Category::RouterOspf,
        Category::AccessList,
        Category::Line,
    ];

    /// Whether entries are whole blocks rather than single lines.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Category::Dhcp
                | Category::Interfaces
                | Category::RouterOspf
                | Category::AccessList
                | Category::Line
        )
    }

    /// Report key.
    pub fn name(&self) -> &'static str {
        match self {
            Category::Hostname => "hostname",
            Category::Username => "username",
            Category::IpDomain => "ip_domain",
            Category::Dhcp => "dhcp",
            Category::DhcpExcluded => "dhcp_excluded",
            Category::Interfaces => "interfaces",
            Category::RouterOspf => "router_ospf",
            Category::AccessList => "access_list",
            Category::Line => "line",
        }
    }

    fn default_prefixes(&self) -> &'static [&'static str] {
        match self {
            Category::Hostname => &["hostname "],
            Category::Username => &["username "],
            Category::IpDomain => &["ip domain"],
            Category::Dhcp => &["ip dhcp pool "],
            Category::DhcpExcluded => &["ip dhcp excluded"],
            Category::Interfaces => &["interface "],
            Category::RouterOspf => &["router ospf"],
            Category::AccessList => &["ip access-list"],
            Category::Line => &["line vty", "line con"],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Header prefixes that assign a top-level line to a category.
///
/// Rules read from configuration extend the built-in prefixes rather than
/// replacing them:
///
/// ```toml
/// [categories]
/// line = ["line aux"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "IndexMap<Category, Vec<String>>",
    into = "IndexMap<Category, Vec<String>>"
)]
pub struct CategoryRules {
    prefixes: IndexMap<Category, Vec<String>>,
}

impl Default for CategoryRules {
    fn default() -> Self {
        let prefixes = Category::ALL
            .iter()
            .map(|c| {
                let defaults = c.default_prefixes().iter().map(|p| p.to_string()).collect();
                (*c, defaults)
            })
            .collect();
        Self { prefixes }
    }
}

impl From<IndexMap<Category, Vec<String>>> for CategoryRules {
    fn from(extra: IndexMap<Category, Vec<String>>) -> Self {
        let mut rules = Self::default();
        for (category, prefixes) in extra {
            for prefix in prefixes {
                rules.add(category, prefix);
            }
        }
        rules
    }
}

impl From<CategoryRules> for IndexMap<Category, Vec<String>> {
    fn from(rules: CategoryRules) -> Self {
        rules.prefixes
    }
}

impl CategoryRules {
    /// Add a header prefix to `category`.
    pub fn add(&mut self, category: Category, prefix: impl Into<String>) {
        let prefix = prefix.into();
        let prefixes = self.prefixes.entry(category).or_default();
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_prefix(mut self, category: Category, prefix: impl Into<String>) -> Self {
        self.add(category, prefix);
        self
    }

    /// These rules plus the prefixes of `extra`.
    pub fn merged(&self, extra: &CategoryRules) -> CategoryRules {
        let mut rules = self.clone();
        for (category, prefixes) in &extra.prefixes {
            for prefix in prefixes {
                rules.add(*category, prefix.clone());
            }
        }
        rules
    }

    /// Prefixes of `category`.
    pub fn prefixes(&self, category: Category) -> &[String] {
        self.prefixes.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Category of a top-level line. The longest matching prefix wins;
    /// indented lines belong to their block and are never classified.
    pub fn classify(&self, line: &str) -> Option<Category> {
        if indent_depth(line) > 0 {
            return None;
        }
        let mut best: Option<(Category, usize)> = None;
        for category in Category::ALL {
            for prefix in self.prefixes(category) {
                if line.starts_with(prefix.as_str())
                    && best.is_none_or(|(_, len)| prefix.len() > len)
                {
                    best = Some((category, prefix.len()));
                }
            }
        }
        best.map(|(category, _)| category)
    }
}

/// Golden configuration missing from the current one, per category.
///
/// Line-level entries are single lines; block-level entries are the block
/// text, header first, one line per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingBlocksReport {
    entries: IndexMap<Category, Vec<String>>,
}

impl Default for MissingBlocksReport {
    fn default() -> Self {
        Self {
            entries: Category::ALL.iter().map(|c| (*c, Vec::new())).collect(),
        }
    }
}

impl MissingBlocksReport {
    /// An empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a missing entry.
    pub fn push(&mut self, category: Category, entry: impl Into<String>) {
        self.entries.entry(category).or_default().push(entry.into());
    }

    /// Entries of `category`, in golden order.
    pub fn get(&self, category: Category) -> &[String] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether every category is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Number of entries across all categories.
    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Every category with its entries, in report order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> {
        self.entries.iter().map(|(c, e)| (*c, e.as_slice()))
    }
}

impl fmt::Display for MissingBlocksReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no drift");
        }
        let mut first = true;
        for (category, entries) in self.iter().filter(|(_, e)| !e.is_empty()) {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", category, entries.len())?;
            first = false;
        }
        Ok(())
    }
}

/// Whether an interface block carries configuration worth restoring.
pub fn is_configured_interface(block: &ConfigBlock) -> bool {
    block.body_starts_with_any(&CONFIGURED_INTERFACE_MARKERS)
}

/// Compare `golden` against `current`.
pub fn compare_configs(
    golden: &CanonicalConfig,
    current: &CanonicalConfig,
    rules: &CategoryRules,
) -> MissingBlocksReport {
    let present: HashSet<&str> = current.lines().iter().map(String::as_str).collect();
    let mut report = MissingBlocksReport::new();

    for line in golden.lines() {
        let Some(category) = rules.classify(line) else {
            continue;
        };

        if !category.is_block() {
            if !present.contains(line.as_str()) {
                debug!("missing {} line: {:?}", category, line);
                report.push(category, line.trim());
            }
            continue;
        }

        let Some(block) = golden.get_config_block(line) else {
            continue;
        };
        if category == Category::Interfaces && !is_configured_interface(&block) {
            continue;
        }
        let drifted = match current.get_config_block(line) {
            Some(existing) => existing.body != block.body,
            None => true,
        };
        if drifted {
            debug!("missing {} block: {:?}", category, block.header);
            report.push(category, block.text());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN: &str = "\
hostname Router1
username admin privilege 15 secret 5 $1$abc
ip domain name lab.local
ip dhcp excluded-address 192.168.1.1 192.168.1.10
ip dhcp pool GUEST
 network 192.168.1.0 255.255.255.0
 default-router 192.168.1.1
interface Ethernet0/0
 description uplink
 ip address 10.0.0.1 255.255.255.0
 ip ospf 1 area 0
interface Ethernet0/1
 shutdown
router ospf 1
 router-id 1.1.1.1
ip access-list standard MGMT
 permit 10.0.0.0 0.0.0.255
line con 0
 logging synchronous
line vty 0 4
 login local
 transport input telnet
";

    fn golden() -> CanonicalConfig {
        CanonicalConfig::from_raw(GOLDEN)
    }

    #[test]
    fn test_self_diff_is_empty() {
        let g = golden();
        let report = compare_configs(&g, &g, &CategoryRules::default());
        assert!(report.is_empty());
        assert_eq!(report.total(), 0);
        assert_eq!(report.to_string(), "no drift");
    }

    #[test]
    fn test_hostname_change_is_exact_line_miss() {
        let g = CanonicalConfig::from_raw("hostname Router1\n");
        let c = CanonicalConfig::from_raw("hostname Router2\n");
        let report = compare_configs(&g, &c, &CategoryRules::default());
        assert_eq!(report.get(Category::Hostname), ["hostname Router1"]);
        assert_eq!(report.total(), 1);
    }

    #[test]
    fn test_missing_dhcp_pool_reported_whole() {
        let g = golden();
        let c = CanonicalConfig::from_raw("hostname Router1\n");
        let report = compare_configs(&g, &c, &CategoryRules::default());
        assert_eq!(
            report.get(Category::Dhcp),
            ["ip dhcp pool GUEST\n network 192.168.1.0 255.255.255.0\n default-router 192.168.1.1"]
        );
        assert_eq!(
            report.get(Category::DhcpExcluded),
            ["ip dhcp excluded-address 192.168.1.1 192.168.1.10"]
        );
        assert!(report.get(Category::Hostname).is_empty());
        assert_eq!(report.get(Category::Line).len(), 2);
    }

    #[test]
    fn test_interface_filter_boundary() {
        let g = CanonicalConfig::from_raw(
            "interface Ethernet0/1\n shutdown\ninterface Ethernet0/2\n ip address 10.0.0.1 255.255.255.0\n shutdown\n",
        );
        let c = CanonicalConfig::default();
        let report = compare_configs(&g, &c, &CategoryRules::default());
        let interfaces = report.get(Category::Interfaces);
        assert_eq!(interfaces.len(), 1);
        assert!(interfaces[0].starts_with("interface Ethernet0/2"));
    }

    #[test]
    fn test_changed_block_body_is_drift() {
        let g = golden();
        let c = CanonicalConfig::from_raw(
            &GOLDEN.replace(" permit 10.0.0.0 0.0.0.255", " permit any"),
        );
        let report = compare_configs(&g, &c, &CategoryRules::default());
        assert_eq!(
            report.get(Category::AccessList),
            ["ip access-list standard MGMT\n permit 10.0.0.0 0.0.0.255"]
        );
        assert_eq!(report.total(), 1);
        assert_eq!(report.to_string(), "access_list: 1");
    }

    #[test]
    fn test_classification() {
        let rules = CategoryRules::default();
        assert_eq!(rules.classify("ip dhcp pool GUEST"), Some(Category::Dhcp));
        assert_eq!(
            rules.classify("ip dhcp excluded-address 10.0.0.1"),
            Some(Category::DhcpExcluded)
        );
        assert_eq!(rules.classify("ip domain lookup"), Some(Category::IpDomain));
        assert_eq!(rules.classify("line vty 0 4"), Some(Category::Line));
        assert_eq!(rules.classify("line aux 0"), None);
        assert_eq!(rules.classify(" ip address 10.0.0.1 255.0.0.0"), None);
        assert_eq!(rules.classify("version 15.2"), None);
    }

    #[test]
    fn test_extended_rules_use_longest_prefix() {
        let rules = CategoryRules::default()
            .with_prefix(Category::Line, "line aux")
            .with_prefix(Category::AccessList, "ip access-list extended");
        assert_eq!(rules.classify("line aux 0"), Some(Category::Line));
        assert_eq!(rules.prefixes(Category::AccessList).len(), 2);

        let merged = CategoryRules::default().merged(&rules);
        assert_eq!(merged, rules);
    }

    #[test]
    fn test_report_order() {
        let mut report = MissingBlocksReport::new();
        report.push(Category::Line, "line con 0\n logging synchronous");
        report.push(Category::Hostname, "hostname R1");
        let order: Vec<_> = report
            .iter()
            .filter(|(_, e)| !e.is_empty())
            .map(|(c, _)| c)
            .collect();
        assert_eq!(order, vec![Category::Hostname, Category::Line]);
        assert_eq!(report.to_string(), "hostname: 1, line: 1");
    }
}
