use serde::Serialize;
use std::{cmp::Ordering, fmt};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum HostMatch {
    Exact(String),
    Suffix { reverse_labels: Vec<String> },
}

// === impl HostMatch ===

impl HostMatch {
    /// Parses a Gateway API hostname. A leading `*.` label denotes a wildcard
    /// that matches any hostname with the remaining suffix; a bare `*`
    /// matches every hostname.
    pub fn parse(hostname: &str) -> Self {
        let hostname = hostname.to_ascii_lowercase();
        if hostname == "*" {
            return Self::Suffix {
                reverse_labels: Vec::new(),
            };
        }

        match hostname.strip_prefix("*.") {
            Some(suffix) => {
                let mut reverse_labels = suffix
                    .split('.')
                    .map(|label| label.to_owned())
                    .collect::<Vec<String>>();
                reverse_labels.reverse();
                Self::Suffix { reverse_labels }
            }
            None => Self::Exact(hostname),
        }
    }

    /// Orders host matches by specificity. `Less` means `self` takes
    /// precedence over `other`.
    ///
    /// Exact hostnames take precedence over wildcards. Among wildcards, the
    /// one with more labels wins, then the one with the longer suffix.
    /// Hostnames that can never compete (two exact names) are equal.
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Exact(_), Self::Exact(_)) => Ordering::Equal,
            (Self::Exact(_), Self::Suffix { .. }) => Ordering::Less,
            (Self::Suffix { .. }, Self::Exact(_)) => Ordering::Greater,
            (Self::Suffix { reverse_labels: a }, Self::Suffix { reverse_labels: b }) => b
                .len()
                .cmp(&a.len())
                .then_with(|| suffix_len(b).cmp(&suffix_len(a))),
        }
    }

    /// Returns the most specific of `hosts`, preferring the first one
    /// encountered among equally specific hosts.
    pub fn most_specific<'h>(
        hosts: impl IntoIterator<Item = &'h HostMatch>,
    ) -> Option<&'h Self> {
        hosts.into_iter().min_by(|a, b| a.precedence_cmp(b))
    }
}

fn suffix_len(labels: &[String]) -> usize {
    labels.iter().map(String::len).sum::<usize>() + labels.len().saturating_sub(1)
}

impl fmt::Display for HostMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(host) => host.fmt(f),
            Self::Suffix { reverse_labels } if reverse_labels.is_empty() => "*".fmt(f),
            Self::Suffix { reverse_labels } => {
                f.write_str("*")?;
                for label in reverse_labels.iter().rev() {
                    write!(f, ".{label}")?;
                }
                Ok(())
            }
        }
    }
}
