use std::fmt::{Display, Formatter};

use untangle_normalize::{ExtraName, PackageName};
use untangle_pep508::Requirement;

/// The unit of decision of the resolver: a package name with a set of extras.
///
/// `requests` and `requests[socks]` are different identifiers and are pinned separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    name: PackageName,
    /// Sorted and deduplicated.
    extras: Vec<ExtraName>,
}

impl Identifier {
    pub fn new(name: PackageName, extras: impl IntoIterator<Item = ExtraName>) -> Self {
        let mut extras = extras.into_iter().collect::<Vec<_>>();
        extras.sort_unstable();
        extras.dedup();
        Self { name, extras }
    }

    pub fn from_requirement(requirement: &Requirement) -> Self {
        Self::new(requirement.name.clone(), requirement.extras.iter().cloned())
    }

    pub fn name(&self) -> &PackageName {
        &self.name
    }

    pub fn extras(&self) -> &[ExtraName] {
        &self.extras
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[")?;
            for (idx, extra) in self.extras.iter().enumerate() {
                if idx > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{extra}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use untangle_pep508::Requirement;

    use super::Identifier;

    fn identify(requirement: &str) -> Identifier {
        Identifier::from_requirement(&Requirement::from_str(requirement).unwrap())
    }

    #[test]
    fn normalized() {
        assert_eq!(identify("PySocks>=1.5"), identify("pysocks"));
        assert_eq!(identify("PySocks").to_string(), "pysocks");
    }

    #[test]
    fn extras_sorted_and_deduplicated() {
        let identifier = identify("Requests[Socks,security,socks]");
        assert_eq!(identifier.to_string(), "requests[security,socks]");
        assert_eq!(identifier, identify("requests[security,socks]"));
    }

    #[test]
    fn extras_distinguish() {
        assert_ne!(identify("requests"), identify("requests[socks]"));
        assert!(identify("requests") < identify("requests[socks]"));
    }
}
