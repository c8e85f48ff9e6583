// ✅ Eligibility Evaluator - Who is ready to graduate?
//
// Pure projection over three snapshots: curriculum master items, members,
// and verified progress records. Recomputed from scratch on every snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::curriculum::{CurriculumItem, ProgressRecord};
use crate::member::Member;
use crate::rank::Rank;

/// Required vs completed curriculum items for one member at one rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub required: usize,
    pub completed: usize,
}

impl Completion {
    pub fn is_ready(&self) -> bool {
        self.required > 0 && self.completed >= self.required
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityEntry {
    pub member_id: String,
    pub member_name: String,
    /// Rank the member holds now; pass this to the graduation transaction
    pub current_rank: Rank,
    pub target_rank: Rank,
    pub required_count: usize,
    pub completed_count: usize,
    pub is_ready: bool,
}

/// Entries split into the promotion center's two lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub ready: Vec<EligibilityEntry>,
    pub in_progress: Vec<EligibilityEntry>,
}

impl EligibilityReport {
    pub fn from_entries(entries: Vec<EligibilityEntry>) -> Self {
        let (ready, in_progress) = entries.into_iter().partition(|e| e.is_ready);
        EligibilityReport { ready, in_progress }
    }

    pub fn total(&self) -> usize {
        self.ready.len() + self.in_progress.len()
    }

    pub fn find(&self, member_id: &str) -> Option<&EligibilityEntry> {
        self.ready
            .iter()
            .chain(self.in_progress.iter())
            .find(|e| e.member_id == member_id)
    }
}

/// Completion of `target`'s curriculum for one member.
///
/// `required` is the set of item indices at `target` that apply to the
/// member; religion variants for other faiths are left out. `completed`
/// counts verified records whose index is in that set, once per index.
/// Records for other ranks, other faiths' variants or unknown indices never count.
pub fn completion(
    member: &Member,
    target: Rank,
    items: &[CurriculumItem],
    verified: &[ProgressRecord],
) -> Completion {
    let applicable: HashSet<u32> = items
        .iter()
        .filter(|item| item.rank == target && item.applies_to(member.religion.as_deref()))
        .map(|item| item.index)
        .collect();

    let completed = verified
        .iter()
        .filter(|r| r.is_verified() && r.member_id == member.id && r.rank == target)
        .map(|r| r.item_index)
        .filter(|index| applicable.contains(index))
        .collect::<HashSet<_>>()
        .len();

    let required = applicable.len();

    Completion {
        required,
        completed,
    }
}

/// Evaluate every member against their target rank.
///
/// TERAP members and members whose target rank has no curriculum are left
/// out. Output is ordered by member name, then id.
pub fn evaluate(
    items: &[CurriculumItem],
    members: &[Member],
    verified: &[ProgressRecord],
) -> Vec<EligibilityEntry> {
    let mut by_member: HashMap<&str, Vec<ProgressRecord>> = HashMap::new();
    for record in verified.iter().filter(|r| r.is_verified()) {
        by_member
            .entry(record.member_id.as_str())
            .or_default()
            .push(record.clone());
    }

    let mut entries: Vec<EligibilityEntry> = members
        .iter()
        .filter_map(|member| {
            let target = member.target_rank()?;
            let records = by_member
                .get(member.id.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let status = completion(member, target, items, records);

            if status.required == 0 {
                return None;
            }

            Some(EligibilityEntry {
                member_id: member.id.clone(),
                member_name: member.name.clone(),
                current_rank: member.rank,
                target_rank: target,
                required_count: status.required,
                completed_count: status.completed,
                is_ready: status.is_ready(),
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        a.member_name
            .cmp(&b.member_name)
            .then_with(|| a.member_id.cmp(&b.member_id))
    });
    entries
}

/// Convenience: evaluate and partition in one go
pub fn report(
    items: &[CurriculumItem],
    members: &[Member],
    verified: &[ProgressRecord],
) -> EligibilityReport {
    EligibilityReport::from_entries(evaluate(items, members, verified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::{Category, ProgressStatus};

    fn member(id: &str, rank: Rank, religion: Option<&str>) -> Member {
        let mut m = Member::enroll(id, religion);
        m.id = id.to_string();
        m.rank = rank;
        m
    }

    fn verified(member_id: &str, rank: Rank, index: u32) -> ProgressRecord {
        let mut r = ProgressRecord::submit(member_id, rank, index, Category::Sosial);
        r.status = ProgressStatus::Verified;
        r.verifier = Some("kak-pembina".to_string());
        r
    }

    fn ramu_curriculum() -> Vec<CurriculumItem> {
        vec![
            CurriculumItem::new(Rank::Ramu, 1, Category::Spiritual, "Doa"),
            CurriculumItem::new(Rank::Ramu, 2, Category::Emosional, "Dasa Dharma"),
            CurriculumItem::new(Rank::Ramu, 3, Category::Sosial, "Gotong royong"),
            CurriculumItem::new(Rank::Ramu, 4, Category::Spiritual, "Ibadah").with_religion("Islam"),
            CurriculumItem::new(Rank::Ramu, 4, Category::Spiritual, "Ibadah").with_religion("Kristen"),
            CurriculumItem::new(Rank::Rakit, 1, Category::Fisik, "Kemah"),
        ]
    }

    #[test]
    fn test_religion_filtering_of_required_items() {
        let items = vec![
            CurriculumItem::new(Rank::Ramu, 1, Category::Sosial, "Gotong royong"),
            CurriculumItem::new(Rank::Ramu, 4, Category::Spiritual, "Ibadah").with_religion("Islam"),
        ];
        let members = vec![
            member("kristen", Rank::Penggalang, Some("Kristen")),
            member("islam", Rank::Penggalang, Some("Islam")),
        ];

        let entries = evaluate(&items, &members, &[]);
        let kristen = entries.iter().find(|e| e.member_id == "kristen").unwrap();
        let islam = entries.iter().find(|e| e.member_id == "islam").unwrap();

        assert_eq!(kristen.required_count, 1);
        assert_eq!(islam.required_count, 2);
    }

    #[test]
    fn test_other_faith_variants_do_not_inflate_requirement() {
        let items = ramu_curriculum();
        let m = member("a", Rank::Penggalang, Some("Kristen"));
        let status = completion(&m, Rank::Ramu, &items, &[]);

        // items 1..3 plus the Kristen variant of 4, never the Islam one
        assert_eq!(status.required, 4);
    }

    #[test]
    fn test_inapplicable_records_do_not_count() {
        let items = vec![
            CurriculumItem::new(Rank::Ramu, 1, Category::Sosial, "Gotong royong"),
            CurriculumItem::new(Rank::Ramu, 2, Category::Emosional, "Dasa Dharma"),
            CurriculumItem::new(Rank::Ramu, 3, Category::Fisik, "Baris berbaris"),
            CurriculumItem::new(Rank::Ramu, 4, Category::Spiritual, "Sholat").with_religion("Islam"),
        ];
        let m = member("a", Rank::Penggalang, Some("Kristen"));
        let records = vec![
            verified("a", Rank::Ramu, 1),
            verified("a", Rank::Ramu, 2),
            // Islam-only variant and an index the curriculum does not have
            verified("a", Rank::Ramu, 4),
            verified("a", Rank::Ramu, 9),
        ];

        let status = completion(&m, Rank::Ramu, &items, &records);
        assert_eq!(status.required, 3);
        assert_eq!(status.completed, 2);
        assert!(!status.is_ready());

        let mut records = records;
        records.push(verified("a", Rank::Ramu, 3));
        assert!(completion(&m, Rank::Ramu, &items, &records).is_ready());
    }

    #[test]
    fn test_universal_and_religion_variant_share_one_index() {
        let items = vec![
            CurriculumItem::new(Rank::Ramu, 4, Category::Spiritual, "Ibadah"),
            CurriculumItem::new(Rank::Ramu, 4, Category::Spiritual, "Sholat").with_religion("Islam"),
        ];
        let m = member("a", Rank::Penggalang, Some("Islam"));
        let status = completion(&m, Rank::Ramu, &items, &[verified("a", Rank::Ramu, 4)]);

        assert_eq!(status.required, 1);
        assert!(status.is_ready());
    }

    #[test]
    fn test_ready_exactly_at_boundary() {
        let items = ramu_curriculum();
        let members = vec![member("a", Rank::Penggalang, Some("Islam"))];
        let mut records: Vec<ProgressRecord> =
            (1..=4).map(|i| verified("a", Rank::Ramu, i)).collect();

        let entries = evaluate(&items, &members, &records);
        assert_eq!(entries[0].required_count, 4);
        assert_eq!(entries[0].completed_count, 4);
        assert!(entries[0].is_ready);

        records.pop();
        let entries = evaluate(&items, &members, &records);
        assert_eq!(entries[0].completed_count, 3);
        assert!(!entries[0].is_ready);
    }

    #[test]
    fn test_no_curriculum_excludes_member() {
        let items = ramu_curriculum();
        // RAKIT targets TERAP, which has no items here
        let members = vec![member("a", Rank::Rakit, None)];

        assert!(evaluate(&items, &members, &[]).is_empty());
    }

    #[test]
    fn test_terap_members_are_excluded() {
        let items = vec![CurriculumItem::new(Rank::Terap, 1, Category::Fisik, "Pionering")];
        let members = vec![member("a", Rank::Terap, None)];

        assert!(evaluate(&items, &members, &[]).is_empty());
    }

    #[test]
    fn test_stale_rank_records_are_ignored() {
        let items = ramu_curriculum();
        // Member already holds RAMU; old RAMU records must not count towards RAKIT
        let members = vec![member("a", Rank::Ramu, None)];
        let records = vec![
            verified("a", Rank::Ramu, 1),
            verified("a", Rank::Ramu, 2),
            verified("a", Rank::Rakit, 1),
        ];

        let entries = evaluate(&items, &members, &records);
        assert_eq!(entries[0].target_rank, Rank::Rakit);
        assert_eq!(entries[0].required_count, 1);
        assert_eq!(entries[0].completed_count, 1);
        assert!(entries[0].is_ready);
    }

    #[test]
    fn test_duplicate_and_unverified_records() {
        let items = ramu_curriculum();
        let m = member("a", Rank::Penggalang, None);
        let mut pending = verified("a", Rank::Ramu, 2);
        pending.status = ProgressStatus::Pending;
        let records = vec![verified("a", Rank::Ramu, 1), verified("a", Rank::Ramu, 1), pending];

        let status = completion(&m, Rank::Ramu, &items, &records);
        assert_eq!(status.completed, 1);
    }

    #[test]
    fn test_report_partitions_and_orders() {
        let items = ramu_curriculum();
        let members = vec![
            member("z", Rank::Penggalang, None),
            member("b", Rank::Penggalang, None),
            member("a", Rank::Penggalang, None),
        ];
        let records: Vec<ProgressRecord> = (1..=3).map(|i| verified("b", Rank::Ramu, i)).collect();

        let report = report(&items, &members, &records);
        assert_eq!(report.total(), 3);
        assert_eq!(report.ready.len(), 1);
        assert_eq!(report.ready[0].member_id, "b");
        let order: Vec<&str> = report.in_progress.iter().map(|e| e.member_id.as_str()).collect();
        assert_eq!(order, vec!["a", "z"]);
        assert!(report.find("z").is_some());
    }
}
