//! Pure scoring and progress arithmetic. No I/O, no logging.

use crate::config::ScoringConfig;
use crate::state::lobby::{PlayerRecord, PlayerStatus};

/// One inbound progress submission, already validated at the edge.
#[derive(Debug, Clone)]
pub struct AnswerBatch {
    /// Country identifiers the client marked correct.
    pub validated: Vec<String>,
    /// Country identifiers the client marked incorrect.
    pub incorrect: Vec<String>,
    /// Base score delta submitted by the client.
    pub score_delta: i32,
    /// Round size used to compute the completion percentage.
    pub total_questions: u32,
    /// Elapsed answer time in milliseconds, when the client measured one.
    pub answer_time_ms: Option<u64>,
}

/// What a batch did to the player record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressOutcome {
    /// Score after the batch.
    pub score: i32,
    /// Progress after the batch.
    pub progress: f32,
    /// Whether the batch pushed the player to 100%.
    pub finished: bool,
    /// Count of answers not seen before this batch.
    pub newly_answered: usize,
}

/// Speed bonus for a single answer: linear in the remaining headroom under
/// the fast threshold, zero at or above it.
pub fn speed_bonus(config: &ScoringConfig, elapsed_ms: u64) -> i32 {
    if elapsed_ms >= config.fast_answer_threshold_ms || config.fast_answer_threshold_ms == 0 {
        return 0;
    }
    let remaining = (config.fast_answer_threshold_ms - elapsed_ms) as f64;
    let fraction = remaining / config.fast_answer_threshold_ms as f64;
    (config.speed_bonus_max as f64 * fraction).round() as i32
}

/// Streak bonus for one correct answer at the given running streak length,
/// capped per answer.
pub fn streak_bonus(config: &ScoringConfig, streak: u32) -> i32 {
    let raw = config
        .streak_bonus_step
        .saturating_mul(streak.min(i32::MAX as u32) as i32);
    raw.min(config.streak_bonus_cap)
}

/// Completion percentage, clamped to `[0, 100]`.
pub fn progress_percent(total_answered: usize, total_questions: u32) -> f32 {
    if total_questions == 0 {
        return 0.0;
    }
    let raw = 100.0 * total_answered as f32 / total_questions as f32;
    raw.clamp(0.0, 100.0)
}

/// Fold an answer batch into a player record.
///
/// The answer sets are append-only: identifiers already recorded contribute
/// nothing. Score never decreases and progress is monotonically
/// non-decreasing; a batch that reaches 100% flips the player to `finished`.
pub fn apply_answer_batch(
    player: &mut PlayerRecord,
    batch: &AnswerBatch,
    config: &ScoringConfig,
) -> ProgressOutcome {
    let newly_validated: Vec<String> = batch
        .validated
        .iter()
        .filter(|country| {
            !player.validated_countries.contains(*country)
                && !player.incorrect_countries.contains(*country)
        })
        .cloned()
        .collect();
    let newly_incorrect: Vec<String> = batch
        .incorrect
        .iter()
        .filter(|country| {
            !player.validated_countries.contains(*country)
                && !player.incorrect_countries.contains(*country)
        })
        .cloned()
        .collect();

    // The submitted delta is untrusted client input; all accumulation
    // saturates so a hostile delta cannot overflow the score.
    let mut delta = batch.score_delta.max(0);

    for _ in &newly_validated {
        player.consecutive_correct += 1;
        delta = delta.saturating_add(streak_bonus(config, player.consecutive_correct));
    }

    if let Some(elapsed_ms) = batch.answer_time_ms {
        if !newly_validated.is_empty() {
            delta = delta.saturating_add(speed_bonus(config, elapsed_ms));
        }
        player.last_answer_ms = Some(elapsed_ms);
    }

    if !newly_incorrect.is_empty() {
        player.consecutive_correct = 0;
    }

    let newly_answered = newly_validated.len() + newly_incorrect.len();
    player.validated_countries.extend(newly_validated);
    player.incorrect_countries.extend(newly_incorrect);

    player.score = player.score.saturating_add(delta);
    let computed = progress_percent(player.total_answered(), batch.total_questions);
    player.progress = player.progress.max(computed);

    let finished = player.progress >= 100.0;
    if finished {
        player.status = PlayerStatus::Finished;
    }

    ProgressOutcome {
        score: player.score,
        progress: player.progress,
        finished,
        newly_answered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config() -> ScoringConfig {
        ScoringConfig {
            fast_answer_threshold_ms: 5_000,
            speed_bonus_max: 50,
            streak_bonus_step: 5,
            streak_bonus_cap: 30,
        }
    }

    fn player() -> PlayerRecord {
        let mut record = PlayerRecord::new(Uuid::new_v4(), "ada");
        record.status = PlayerStatus::Playing;
        record
    }

    fn batch(validated: &[&str], incorrect: &[&str], delta: i32) -> AnswerBatch {
        AnswerBatch {
            validated: validated.iter().map(|s| s.to_string()).collect(),
            incorrect: incorrect.iter().map(|s| s.to_string()).collect(),
            score_delta: delta,
            total_questions: 4,
            answer_time_ms: None,
        }
    }

    #[test]
    fn speed_bonus_is_zero_at_and_above_threshold() {
        let config = config();
        assert_eq!(speed_bonus(&config, 5_000), 0);
        assert_eq!(speed_bonus(&config, 60_000), 0);
    }

    #[test]
    fn speed_bonus_decreases_with_elapsed_time() {
        let config = config();
        let fast = speed_bonus(&config, 500);
        let slower = speed_bonus(&config, 3_000);
        assert!(fast > slower);
        assert!(slower > 0);
        assert!(fast <= config.speed_bonus_max);
    }

    #[test]
    fn streak_bonus_is_capped() {
        let config = config();
        assert_eq!(streak_bonus(&config, 1), 5);
        assert_eq!(streak_bonus(&config, 6), 30);
        assert_eq!(streak_bonus(&config, 100), 30);
    }

    #[test]
    fn progress_is_clamped_to_one_hundred() {
        assert_eq!(progress_percent(12, 4), 100.0);
        assert_eq!(progress_percent(0, 4), 0.0);
        assert_eq!(progress_percent(1, 4), 25.0);
    }

    #[test]
    fn duplicate_answers_do_not_move_progress_or_score_bonuses() {
        let config = config();
        let mut record = player();

        apply_answer_batch(&mut record, &batch(&["fr"], &[], 10), &config);
        let before = (record.score, record.progress);
        let outcome = apply_answer_batch(&mut record, &batch(&["fr"], &[], 0), &config);

        assert_eq!(outcome.newly_answered, 0);
        assert_eq!((record.score, record.progress), before);
    }

    #[test]
    fn incorrect_answer_resets_the_streak() {
        let config = config();
        let mut record = player();

        apply_answer_batch(&mut record, &batch(&["fr", "de"], &[], 0), &config);
        assert_eq!(record.consecutive_correct, 2);

        apply_answer_batch(&mut record, &batch(&[], &["es"], 0), &config);
        assert_eq!(record.consecutive_correct, 0);
    }

    #[test]
    fn negative_submitted_delta_never_lowers_the_score() {
        let config = config();
        let mut record = player();

        apply_answer_batch(&mut record, &batch(&["fr"], &[], 10), &config);
        let before = record.score;
        apply_answer_batch(&mut record, &batch(&[], &["de"], -100), &config);
        assert!(record.score >= before);
    }

    #[test]
    fn full_progress_marks_the_player_finished() {
        let config = config();
        let mut record = player();

        let outcome = apply_answer_batch(
            &mut record,
            &batch(&["fr", "de", "es"], &["it"], 0),
            &config,
        );

        assert!(outcome.finished);
        assert_eq!(record.progress, 100.0);
        assert_eq!(record.status, PlayerStatus::Finished);
    }

    #[test]
    fn score_saturates_instead_of_overflowing() {
        let config = config();
        let mut record = player();
        record.score = i32::MAX - 1;

        let outcome = apply_answer_batch(&mut record, &batch(&["fr"], &[], i32::MAX), &config);
        assert_eq!(outcome.score, i32::MAX);
        assert_eq!(record.score, i32::MAX);
    }

    #[test]
    fn streak_and_speed_bonuses_accumulate() {
        let config = config();
        let mut record = player();
        let mut fast_batch = batch(&["fr"], &[], 10);
        fast_batch.answer_time_ms = Some(1_000);

        let outcome = apply_answer_batch(&mut record, &fast_batch, &config);
        // 10 base + 5 streak + 40 speed (4/5 of headroom).
        assert_eq!(outcome.score, 55);
    }
}
