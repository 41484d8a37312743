//! Picks the manifest entry (if any) this device should install.
//!
//! Entries are evaluated in manifest order and the first one that is both
//! eligible for this device and version-qualified wins. Later entries are
//! never considered once something is selected.

use core::cmp::Ordering;

use log::debug;

use crate::config::UpdatePolicy;
use crate::identity::DeviceIdentity;
use crate::manifest::{Manifest, ManifestProfile};
use crate::version::VersionComparator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult<'m> {
    /// No entry's board/device/config constraints fit this device
    NoProfileFound,
    /// Some entry fit the device, but none was worth installing
    NoUpdateApplicable,
    Selected(&'m ManifestProfile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchReport<'m> {
    pub result: MatchResult<'m>,
    /// Version of the deciding entry: the selected one, or the last
    /// eligible entry inspected
    pub candidate_version: Option<&'m str>,
}

/// Empty/absent constraint matches anything, otherwise exact, case-sensitive
fn field_matches(constraint: Option<&str>, actual: &str) -> bool {
    match constraint {
        None | Some("") => true,
        Some(wanted) => wanted == actual,
    }
}

/// Whether a profile's identity constraints fit this device
pub fn is_eligible(profile: &ManifestProfile, identity: &DeviceIdentity) -> bool {
    field_matches(profile.board.as_deref(), &identity.board)
        && field_matches(profile.device_id.as_deref(), &identity.device_id)
        && field_matches(profile.config_tag.as_deref(), &identity.config_tag)
}

/// Whether an eligible profile's version qualifies for install
pub fn is_version_qualified(
    candidate: &str,
    current: &str,
    policy: &UpdatePolicy,
    comparator: &dyn VersionComparator,
) -> bool {
    if candidate.is_empty() {
        return true;
    }
    match comparator.compare(candidate, current) {
        Ordering::Greater => true,
        Ordering::Less => policy.allow_downgrades,
        Ordering::Equal => false,
    }
}

pub fn match_profile<'m>(
    manifest: &'m Manifest,
    identity: &DeviceIdentity,
    policy: &UpdatePolicy,
    comparator: &dyn VersionComparator,
) -> MatchReport<'m> {
    debug!(
        "Looking for a profile matching board={:?} device={:?} config={:?} version={:?}",
        identity.board, identity.device_id, identity.config_tag, identity.current_version
    );

    let mut seen: Option<&'m str> = None;

    for (index, profile) in manifest.profiles.iter().enumerate() {
        if !is_eligible(profile, identity) {
            debug!("Profile #{} not for this device", index);
            continue;
        }

        let version = profile.version_str();
        if is_version_qualified(version, &identity.current_version, policy, comparator) {
            debug!("Profile #{} selected (version {:?})", index, version);
            return MatchReport {
                result: MatchResult::Selected(profile),
                candidate_version: Some(version),
            };
        }

        debug!("Profile #{} matches device but version {:?} does not qualify", index, version);
        seen = Some(version);
    }

    let result = if seen.is_some() {
        MatchResult::NoUpdateApplicable
    } else {
        MatchResult::NoProfileFound
    };
    MatchReport {
        result,
        candidate_version: seen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{Lexicographic, Semantic};
    use proptest::prelude::*;

    fn identity(board: &str, device: &str, config: &str, version: &str) -> DeviceIdentity {
        DeviceIdentity {
            board: board.into(),
            device_id: device.into(),
            config_tag: config.into(),
            current_version: version.into(),
        }
    }

    fn run<'m>(manifest: &'m Manifest, id: &DeviceIdentity, policy: UpdatePolicy) -> MatchResult<'m> {
        match_profile(manifest, id, &policy, &Lexicographic).result
    }

    #[test]
    fn test_empty_manifest() {
        let id = identity("B", "D", "", "1.0.0");
        assert_eq!(run(&Manifest::default(), &id, UpdatePolicy::default()), MatchResult::NoProfileFound);
    }

    #[test]
    fn test_wildcard_profile_with_empty_version_selected() {
        let manifest = Manifest::from(vec![ManifestProfile::new("x.bin")
            .board("")
            .device("")
            .version("")]);
        let id = identity("B", "D", "", "1.0.0");
        assert_eq!(
            run(&manifest, &id, UpdatePolicy::default()),
            MatchResult::Selected(&manifest.profiles[0])
        );
    }

    #[test]
    fn test_board_mismatch_is_no_profile() {
        let manifest = Manifest::from(vec![ManifestProfile::new("x.bin").board("X").version("2.0.0")]);
        let id = identity("Y", "D", "", "1.0.0");
        assert_eq!(run(&manifest, &id, UpdatePolicy::default()), MatchResult::NoProfileFound);
    }

    #[test]
    fn test_equal_version_is_no_update() {
        let manifest = Manifest::from(vec![ManifestProfile::default().version("1.0.0")]);
        let id = identity("B", "D", "", "1.0.0");
        assert_eq!(run(&manifest, &id, UpdatePolicy::default()), MatchResult::NoUpdateApplicable);
        // Downgrades allowed still refuses an identical version
        let policy = UpdatePolicy::default().with_downgrades(true);
        assert_eq!(run(&manifest, &id, policy), MatchResult::NoUpdateApplicable);
    }

    #[test]
    fn test_downgrade_needs_policy() {
        let manifest = Manifest::from(vec![ManifestProfile::new("old.bin").version("0.9.0")]);
        let id = identity("B", "D", "", "1.0.0");
        assert_eq!(run(&manifest, &id, UpdatePolicy::default()), MatchResult::NoUpdateApplicable);
        assert_eq!(
            run(&manifest, &id, UpdatePolicy::default().with_downgrades(true)),
            MatchResult::Selected(&manifest.profiles[0])
        );
    }

    #[test]
    fn test_lexicographic_quirk_preserved() {
        // "10.0.0" sorts below "9.0.0", so it is not an upgrade
        let manifest = Manifest::from(vec![ManifestProfile::new("fw.bin").version("10.0.0")]);
        let id = identity("B", "D", "", "9.0.0");
        assert_eq!(run(&manifest, &id, UpdatePolicy::default()), MatchResult::NoUpdateApplicable);

        let report = match_profile(&manifest, &id, &UpdatePolicy::default(), &Semantic);
        assert_eq!(report.result, MatchResult::Selected(&manifest.profiles[0]));
    }

    #[test]
    fn test_first_qualifying_entry_wins() {
        let manifest = Manifest::from(vec![
            ManifestProfile::new("other.bin").board("OTHER").version("9.9.9"),
            ManifestProfile::new("same.bin").board("B").version("1.0.0"),
            ManifestProfile::new("first.bin").board("B").version("1.1.0"),
            ManifestProfile::new("second.bin").version("1.5.0"),
        ]);
        let id = identity("B", "D", "", "1.0.0");
        let report = match_profile(&manifest, &id, &UpdatePolicy::default(), &Lexicographic);
        assert_eq!(report.result, MatchResult::Selected(&manifest.profiles[2]));
        assert_eq!(report.candidate_version, Some("1.1.0"));
    }

    #[test]
    fn test_device_and_config_must_match_exactly() {
        let manifest = Manifest::from(vec![
            ManifestProfile::new("a.bin").device("aa:bb:cc:dd:ee:ff"),
            ManifestProfile::new("b.bin").config("Beta"),
            ManifestProfile::new("c.bin").device("AA:BB:CC:DD:EE:FF").config("beta"),
        ]);
        let id = identity("B", "AA:BB:CC:DD:EE:FF", "beta", "1.0.0");
        assert_eq!(
            run(&manifest, &id, UpdatePolicy::default()),
            MatchResult::Selected(&manifest.profiles[2])
        );
    }

    #[test]
    fn test_candidate_version_reports_last_eligible() {
        let manifest = Manifest::from(vec![
            ManifestProfile::default().version("0.5.0"),
            ManifestProfile::default().board("X").version("9.0.0"),
            ManifestProfile::default().version("0.8.0"),
        ]);
        let id = identity("B", "D", "", "1.0.0");
        let report = match_profile(&manifest, &id, &UpdatePolicy::default(), &Lexicographic);
        assert_eq!(report.result, MatchResult::NoUpdateApplicable);
        assert_eq!(report.candidate_version, Some("0.8.0"));
    }

    fn field() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[A-C]{0,2}")
    }

    fn profile() -> impl Strategy<Value = ManifestProfile> {
        (field(), field(), field(), field()).prop_map(|(board, device_id, config_tag, version)| {
            ManifestProfile {
                board,
                device_id,
                config_tag,
                version,
                binary_url: "fw.bin".into(),
            }
        })
    }

    proptest! {
        #[test]
        fn prop_no_eligible_entry_means_no_profile(
            profiles in prop::collection::vec(profile(), 0..8),
            downgrades in any::<bool>(),
        ) {
            // Identity fields can never equal the generated [A-C] constraints
            let id = identity("Z", "Z", "Z", "1.0.0");
            let manifest = Manifest::from(
                profiles
                    .into_iter()
                    .map(|mut p| {
                        if p.board.as_deref().unwrap_or("").is_empty() {
                            p.board = Some("A".into());
                        }
                        p
                    })
                    .collect::<Vec<_>>(),
            );
            let policy = UpdatePolicy::default().with_downgrades(downgrades);
            prop_assert_eq!(run(&manifest, &id, policy), MatchResult::NoProfileFound);
        }

        #[test]
        fn prop_empty_version_always_selected(
            current in "[0-9.]{0,6}",
            downgrades in any::<bool>(),
            dry_run in any::<bool>(),
        ) {
            let manifest = Manifest::from(vec![ManifestProfile::new("fw.bin")]);
            let id = identity("B", "D", "C", &current);
            let policy = UpdatePolicy { allow_downgrades: downgrades, dry_run, reboot_after_update: true };
            prop_assert_eq!(run(&manifest, &id, policy), MatchResult::Selected(&manifest.profiles[0]));
        }

        #[test]
        fn prop_selection_is_eligible_and_qualified(
            profiles in prop::collection::vec(profile(), 0..8),
            current in "[A-C]{0,2}",
            downgrades in any::<bool>(),
        ) {
            let manifest = Manifest::from(profiles);
            let id = identity("A", "B", "C", &current);
            let policy = UpdatePolicy::default().with_downgrades(downgrades);
            let report = match_profile(&manifest, &id, &policy, &Lexicographic);
            if let MatchResult::Selected(p) = report.result {
                prop_assert!(is_eligible(p, &id));
                prop_assert!(is_version_qualified(p.version_str(), &current, &policy, &Lexicographic));
                // Nothing earlier would also have been chosen
                let first = manifest.profiles.iter().position(|q| {
                    is_eligible(q, &id)
                        && is_version_qualified(q.version_str(), &current, &policy, &Lexicographic)
                });
                prop_assert_eq!(first.map(|i| &manifest.profiles[i]), Some(p));
            }
        }
    }
}
