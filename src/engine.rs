use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::aggregate::{OutcomeDistribution, aggregate};
use crate::calibration::{CalibrationReport, ConfidenceRecord, run_confidence_calibration};
use crate::config::EngineConfig;
use crate::context::MatchContext;
use crate::error::SimResult;
use crate::learning::{
    LearningLoop, LoggedMatch, NarrativeLearning, NarrativeUpdateReport, PowerUpdateReport,
};
use crate::ratings::{MatchupProfile, RatingSnapshot, RatingStore};
use crate::trial::{TimelineEvent, TrialEngine};
use crate::value::{MarketOdds, ValueBet, calculate_value, filter_min_edge};

/// Entry point that ties a rating store to simulation, valuation and learning.
pub struct Engine<S: RatingStore> {
    store: S,
    config: EngineConfig,
    learner: LearningLoop,
}

impl<S: RatingStore> Engine<S> {
    /// Wraps `store`, resuming any learning batch it still holds.
    pub fn new(store: S, config: EngineConfig) -> SimResult<Self> {
        let learner = LearningLoop::resume(&store)?;
        Ok(Self {
            store,
            config,
            learner,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Full Monte Carlo run with the configured trial count.
    pub fn simulate(&self, ctx: &MatchContext) -> SimResult<OutcomeDistribution> {
        self.simulate_trials(ctx, self.config.sim.trials)
    }

    pub fn simulate_trials(
        &self,
        ctx: &MatchContext,
        trial_count: u32,
    ) -> SimResult<OutcomeDistribution> {
        let profile = MatchupProfile::resolve(&self.store, ctx);
        aggregate(ctx, &profile, &self.config.sim, trial_count)
    }

    /// One representative match. Uses the configured seed when there is one.
    pub fn build_timeline(&self, ctx: &MatchContext) -> SimResult<Vec<TimelineEvent>> {
        ctx.validate()?;
        let profile = MatchupProfile::resolve(&self.store, ctx);
        let engine = TrialEngine::new(ctx, &profile, &self.config.sim);
        let mut rng = match self.config.sim.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(engine.build_timeline(&mut rng))
    }

    /// Every quoted market with its edge, best first.
    pub fn value(
        &self,
        distribution: &OutcomeDistribution,
        odds: &[MarketOdds],
    ) -> SimResult<Vec<ValueBet>> {
        calculate_value(distribution, odds)
    }

    /// Only the markets whose edge clears the configured minimum.
    pub fn value_bets(
        &self,
        distribution: &OutcomeDistribution,
        odds: &[MarketOdds],
    ) -> SimResult<Vec<ValueBet>> {
        let all = calculate_value(distribution, odds)?;
        Ok(filter_min_edge(all, self.config.value.min_edge_pct))
    }

    pub fn log_match_result(&self, entry: LoggedMatch) -> SimResult<()> {
        self.learner.log_match_result(&self.store, entry)?;
        Ok(())
    }

    pub fn pending_results(&self) -> usize {
        self.learner.pending_len()
    }

    pub fn run_power_rating_update(&self) -> SimResult<PowerUpdateReport> {
        let report = self
            .learner
            .run_power_rating_update(&self.store, &self.config.learning)?;
        Ok(report)
    }

    pub fn apply_narrative_learnings(
        &self,
        learnings: &[NarrativeLearning],
    ) -> SimResult<NarrativeUpdateReport> {
        let report =
            self.learner
                .apply_narrative_learnings(&self.store, learnings, &self.config.learning)?;
        Ok(report)
    }

    pub fn get_ratings(&self) -> RatingSnapshot {
        self.store.snapshot()
    }

    pub fn run_confidence_calibration(&self, history: &[ConfidenceRecord]) -> CalibrationReport {
        let report = run_confidence_calibration(history, &self.config.calibration);
        info!(
            records = report.total_records,
            buckets = report.buckets.len(),
            insufficient = report.insufficient,
            "confidence calibration complete"
        );
        report
    }
}
