//! Per-image top-K pruning of candidate neighbours.

use log::debug;

use crate::matching::MatchTable;
use crate::types::ImageIndex;

/// Keeps, for every image `i`, only the `maximum_matches` images `j` with the
/// longest `MatchList(i, j)` and nulls the rest.
///
/// Ties are broken by ascending image index. Rows are pruned independently,
/// so `j` may survive in row `i` while `i` is dropped from row `j`.
#[derive(Debug, Clone, Copy)]
pub struct MatchPruner {
    pub maximum_matches: usize,
}

impl MatchPruner {
    pub fn new(maximum_matches: usize) -> Self {
        Self { maximum_matches }
    }

    /// Ranked neighbours of `i`, best first.
    pub fn ranking(&self, table: &MatchTable, i: ImageIndex) -> Vec<ImageIndex> {
        let mut others: Vec<ImageIndex> = (0..table.image_count()).filter(|&j| j != i).collect();
        // stable sort keeps ascending index among equal counts
        others.sort_by(|&a, &b| table.count(i, b).cmp(&table.count(i, a)));
        others
    }

    /// Prune every row in place; returns the number of lists nulled.
    pub fn prune(&self, table: &mut MatchTable) -> usize {
        let mut nulled = 0;
        for i in 0..table.image_count() {
            let ranking = self.ranking(table, i);
            for &j in ranking.iter().skip(self.maximum_matches) {
                if table.take(i, j).is_some() {
                    nulled += 1;
                }
            }
            debug!(
                "Image {i}: kept neighbours {:?}",
                &ranking[..ranking.len().min(self.maximum_matches)]
            );
        }
        nulled
    }
}
