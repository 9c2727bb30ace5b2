//! Label routing.
//!
//! Maps the labels of a job to the runner slot that should serve it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Label prefix used when none is configured.
pub const DEFAULT_LABEL_PREFIX: &str = "koyeb";

/// The `(region, instance class)` pair a job's labels resolve to.
///
/// There is one runner slot per target, shared by every job that routes to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub region: String,
    pub instance_class: String,
}

impl Target {
    pub fn new(region: impl Into<String>, instance_class: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            instance_class: instance_class.into(),
        }
    }

    /// Deterministic name of the runner service backing this target.
    pub fn service_name(&self) -> String {
        format!("runner-{}-{}", self.region, self.instance_class)
    }

    /// The label a runner for this target registers with.
    pub fn runner_label(&self, prefix: &str) -> String {
        format!("{prefix}-{}-{}", self.region, self.instance_class)
    }

    /// Whether both region and instance class are set.
    pub fn is_complete(&self) -> bool {
        !self.region.is_empty() && !self.instance_class.is_empty()
    }

    /// Scope string restricting a deployment setting to this target's region.
    pub fn region_scope(&self) -> String {
        format!("region:{}", self.region)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.instance_class)
    }
}

/// Resolve the first label shaped `<prefix>-<region>-<class>`.
///
/// A label matches with exactly three `-` separated segments, the first equal
/// to `prefix`. Region and class are taken verbatim and may be empty; see
/// [`Target::is_complete`].
pub fn route<S: AsRef<str>>(labels: &[S], prefix: &str) -> Option<Target> {
    labels.iter().find_map(|label| parse_label(label.as_ref(), prefix))
}

fn parse_label(label: &str, prefix: &str) -> Option<Target> {
    let mut parts = label.split('-');
    let (first, region, class) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || first != prefix {
        return None;
    }
    Some(Target::new(region, class))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["self-hosted", "koyeb-fra-small"], Some(("fra", "small")))]
    #[case(&["koyeb-was-medium", "koyeb-fra-small"], Some(("was", "medium")))]
    #[case(&["self-hosted", "linux"], None)]
    #[case(&[], None)]
    #[case(&["koyeb-fra"], None)]
    #[case(&["koyeb-fra-small-extra"], None)]
    #[case(&["other-fra-small"], None)]
    #[case(&["Koyeb-fra-small"], None)]
    #[case(&["koyeb--small", "koyeb-fra-small"], Some(("", "small")))]
    #[case(&["linux", "koyeb-fra-", "koyeb-sin-nano"], Some(("fra", "")))]
    fn test_route(#[case] labels: &[&str], #[case] expected: Option<(&str, &str)>) {
        let expected = expected.map(|(region, class)| Target::new(region, class));
        assert_eq!(route(labels, DEFAULT_LABEL_PREFIX), expected);
    }

    #[test]
    fn test_route_custom_prefix() {
        let labels = ["koyeb-fra-small", "gpu-par-large"];
        assert_eq!(route(&labels, "gpu"), Some(Target::new("par", "large")));
    }

    #[rstest]
    #[case("fra", "small", true)]
    #[case("", "small", false)]
    #[case("fra", "", false)]
    fn test_target_is_complete(#[case] region: &str, #[case] class: &str, #[case] complete: bool) {
        assert_eq!(Target::new(region, class).is_complete(), complete);
    }

    #[test]
    fn test_target_names() {
        let target = Target::new("fra", "small");
        assert_eq!(target.service_name(), "runner-fra-small");
        assert_eq!(target.runner_label("koyeb"), "koyeb-fra-small");
        assert_eq!(target.region_scope(), "region:fra");
        assert_eq!(target.to_string(), "fra/small");
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }

    fn noise_label() -> impl Strategy<Value = String> {
        // Never starts with the prefix segment, so it can never match.
        "[a-jl-z][a-z0-9-]{0,16}"
    }

    proptest! {
        #[test]
        fn prop_first_match_wins(
            before in prop::collection::vec(noise_label(), 0..5),
            after in prop::collection::vec(noise_label(), 0..5),
            first in (segment(), segment()),
            second in (segment(), segment()),
        ) {
            let mut labels = before.clone();
            labels.push(format!("koyeb-{}-{}", first.0, first.1));
            labels.extend(after.iter().cloned());
            labels.push(format!("koyeb-{}-{}", second.0, second.1));

            prop_assert_eq!(route(&labels, "koyeb"), Some(Target::new(first.0, first.1)));
        }

        #[test]
        fn prop_noise_never_routes(labels in prop::collection::vec(noise_label(), 0..8)) {
            prop_assert_eq!(route(&labels, "koyeb"), None);
        }
    }
}
