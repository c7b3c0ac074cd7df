//! Hotspot analyzer: top-k files by hotness = normalized complexity ×
//! normalized churn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::Result;
use crate::core::model::Hotspot;
use crate::core::pipeline::context::StageView;
use crate::core::registry::{AnalyzerInfo, AnalyzerKind};

use super::{Analyzer, AnalyzerOutput, AnalyzerRun};

/// Output of the hotspot analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotspotFacts {
    /// Ranked hotspots, highest hotness first
    pub hotspots: Vec<Hotspot>,
}

/// Complexity × churn ranking.
pub struct HotspotsAnalyzer {
    info: AnalyzerInfo,
}

impl HotspotsAnalyzer {
    /// Create the analyzer.
    pub fn new() -> Self {
        Self {
            info: AnalyzerInfo::new(
                AnalyzerKind::Hotspots,
                &[AnalyzerKind::Complexity, AnalyzerKind::History],
                1,
            ),
        }
    }
}

impl Default for HotspotsAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for HotspotsAnalyzer {
    fn info(&self) -> &AnalyzerInfo {
        &self.info
    }

    async fn run(&self, view: StageView) -> Result<AnalyzerRun> {
        let complexity = view.complexity(AnalyzerKind::Hotspots)?;
        let history = view.history(AnalyzerKind::Hotspots)?;

        let max_complexity = complexity
            .per_file
            .values()
            .map(|m| m.complexity)
            .fold(0.0_f64, f64::max);
        let max_churn = history
            .churn
            .values()
            .copied()
            .max()
            .unwrap_or(0) as f64;

        // A history-less repository scores hotness 0 everywhere; that is a
        // measurement absence, not an issue.
        let mut ranked: Vec<Hotspot> = complexity
            .per_file
            .iter()
            .map(|(path, measure)| {
                let churn = history.churn.get(path).copied().unwrap_or(0);
                let normalized_complexity = if max_complexity > 0.0 {
                    measure.complexity / max_complexity
                } else {
                    0.0
                };
                let normalized_churn = if max_churn > 0.0 {
                    churn as f64 / max_churn
                } else {
                    0.0
                };
                Hotspot {
                    path: path.clone(),
                    hotness: (normalized_complexity * normalized_churn).clamp(0.0, 1.0),
                    churn,
                }
            })
            .collect();

        // Hotness descending; ties by churn descending, then path ascending
        ranked.sort_by(|a, b| {
            b.hotness
                .partial_cmp(&a.hotness)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.churn.cmp(&a.churn))
                .then(a.path.cmp(&b.path))
        });
        ranked.truncate(view.policy.hotspot_top_k);

        debug!(hotspots = ranked.len(), "hotspot ranking complete");

        Ok(AnalyzerRun::output_only(AnalyzerOutput::Hotspots(
            HotspotFacts { hotspots: ranked },
        )))
    }
}
