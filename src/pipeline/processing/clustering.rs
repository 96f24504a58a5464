use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MAX_WINDOW_DAYS;
use crate::domain::{CandidateId, RawCandidateRecord, TargetFamily};
use crate::observability::metrics;
use crate::pipeline::processing::normalize::normalize_opt;
use crate::pipeline::processing::similarity::{PairDecision, SimilarityScore, SimilarityScorer};
use crate::pipeline::storage::CandidateStore;

/// Union-find over store positions, with path halving and union by rank
#[derive(Debug)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Returns false when both were already in the same set.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// Approximate date, location and target family. Used for indexing and
/// logging only, never as identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterKey {
    pub date: NaiveDate,
    pub location: String,
    pub family: TargetFamily,
}

/// A pairwise decision that joined two previously separate groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterLink {
    pub a: CandidateId,
    pub b: CandidateId,
    pub score: SimilarityScore,
}

impl ClusterLink {
    pub fn is_ambiguous(&self) -> bool {
        self.score.decision == PairDecision::Ambiguous
    }
}

/// Frozen set of candidate ids believed to describe one incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentCluster {
    pub key: ClusterKey,
    /// Member ids in store order
    pub members: Vec<CandidateId>,
    pub links: Vec<ClusterLink>,
}

impl IncidentCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ambiguous_links(&self) -> impl Iterator<Item = &ClusterLink> {
        self.links.iter().filter(|l| l.is_ambiguous())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusteringStats {
    pub pairs_compared: usize,
    pub merge_links: usize,
    pub ambiguous_links: usize,
}

/// Partitions the store into incident clusters.
pub struct Clusterer<'a> {
    scorer: &'a dyn SimilarityScorer,
}

impl<'a> Clusterer<'a> {
    pub fn new(scorer: &'a dyn SimilarityScorer) -> Self {
        Self { scorer }
    }

    /// Compare every pair whose event dates fall within the scorer's window,
    /// union the merges, and freeze the partition.
    ///
    /// Confident merges are applied before ambiguous ones, so an ambiguous
    /// link is only recorded when it is what actually joins two groups.
    pub fn cluster(&self, store: &CandidateStore) -> (Vec<IncidentCluster>, ClusteringStats) {
        let records = store.records();
        let window = self.scorer.temporal_window_days().clamp(0, MAX_WINDOW_DAYS);

        let mut buckets: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (i, record) in records.iter().enumerate() {
            buckets.entry(record.event_date).or_default().push(i);
        }

        let mut stats = ClusteringStats::default();
        let mut edges: Vec<(usize, usize, SimilarityScore)> = Vec::new();
        for (i, a) in records.iter().enumerate() {
            let upper = a
                .event_date
                .checked_add_signed(Duration::days(window))
                .unwrap_or(NaiveDate::MAX);
            for (&date, bucket) in buckets.range(a.event_date..=upper) {
                for &j in bucket {
                    if date == a.event_date && j <= i {
                        continue;
                    }
                    stats.pairs_compared += 1;
                    let score = self.scorer.score(a, &records[j]);
                    debug!(
                        "Pair {} ~ {}: total={:.3} location={:?} target={:?} decision={:?}",
                        a.id, records[j].id, score.total, score.location, score.target_basis, score.decision
                    );
                    if score.decision != PairDecision::Distinct {
                        edges.push((i, j, score));
                    }
                }
            }
        }
        metrics::clustering::pairs_compared(stats.pairs_compared as u64);

        // Confident merges first, then ambiguous; store order within each
        edges.sort_by_key(|(i, j, score)| (score.decision == PairDecision::Ambiguous, *i, *j));

        let mut sets = DisjointSet::new(records.len());
        let mut joining: Vec<(usize, usize, SimilarityScore)> = Vec::new();
        for (i, j, score) in edges {
            if sets.union(i, j) {
                if score.decision == PairDecision::Ambiguous {
                    stats.ambiguous_links += 1;
                } else {
                    stats.merge_links += 1;
                }
                joining.push((i, j, score));
            }
        }

        let clusters = freeze(records, &mut sets, joining);
        let merged = clusters.iter().filter(|c| c.len() > 1).count();
        metrics::clustering::clusters_formed(clusters.len() as u64, merged as u64);
        metrics::clustering::ambiguous_links(stats.ambiguous_links as u64);
        info!(
            "Clustered {} candidates into {} clusters ({} merged, {} ambiguous links, {} pairs compared)",
            records.len(),
            clusters.len(),
            merged,
            stats.ambiguous_links,
            stats.pairs_compared
        );
        (clusters, stats)
    }
}

fn freeze(
    records: &[RawCandidateRecord],
    sets: &mut DisjointSet,
    joining: Vec<(usize, usize, SimilarityScore)>,
) -> Vec<IncidentCluster> {
    // Cluster order follows the first member's store position
    let mut order: Vec<usize> = Vec::new();
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..records.len() {
        let root = sets.find(i);
        let members = groups.entry(root).or_default();
        if members.is_empty() {
            order.push(root);
        }
        members.push(i);
    }

    let mut links: HashMap<usize, Vec<ClusterLink>> = HashMap::new();
    for (i, j, score) in joining {
        let root = sets.find(i);
        links.entry(root).or_default().push(ClusterLink {
            a: records[i].id.clone(),
            b: records[j].id.clone(),
            score,
        });
    }

    order
        .into_iter()
        .map(|root| {
            let members = groups.remove(&root).unwrap_or_default();
            IncidentCluster {
                key: cluster_key(records, &members),
                members: members.iter().map(|&i| records[i].id.clone()).collect(),
                links: links.remove(&root).unwrap_or_default(),
            }
        })
        .collect()
}

fn cluster_key(records: &[RawCandidateRecord], members: &[usize]) -> ClusterKey {
    let member_records = || members.iter().map(|&i| &records[i]);
    let date = member_records()
        .map(|r| r.event_date)
        .min()
        .unwrap_or(NaiveDate::MIN);
    let location = member_records()
        .find_map(|r| normalize_opt(r.city.as_deref()))
        .or_else(|| member_records().find_map(|r| normalize_opt(r.region.as_deref())))
        .unwrap_or_else(|| "unknown".to_string());
    let family = member_records()
        .find_map(|r| r.target_type.filter(|t| t.is_specific()))
        .map(|t| t.family())
        .unwrap_or(TargetFamily::Unknown);
    ClusterKey {
        date,
        location,
        family,
    }
}
