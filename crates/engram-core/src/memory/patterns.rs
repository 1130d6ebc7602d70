//! Per-user behavioral patterns
//!
//! A mutable record of how the user communicates: message frequency,
//! engagement, affect smoothed through a pair of exponential moving
//! averages, and the response preferences (trust score + proactiveness
//! dial) that gate the gap pipeline. Writes are best-effort.

use serde::{Deserialize, Serialize};

// ============================================================================
// PROACTIVENESS DIAL
// ============================================================================

/// Coarse user-facing control over how readily the agent follows up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProactivenessDial {
    Conservative,
    #[default]
    Moderate,
    Eager,
}

impl ProactivenessDial {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProactivenessDial::Conservative => "conservative",
            ProactivenessDial::Moderate => "moderate",
            ProactivenessDial::Eager => "eager",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "conservative" => ProactivenessDial::Conservative,
            "eager" => ProactivenessDial::Eager,
            _ => ProactivenessDial::Moderate,
        }
    }
}

impl std::fmt::Display for ProactivenessDial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// AFFECT
// ============================================================================

/// Fast/slow EMA pair over valence and arousal
///
/// The fast average tracks the current conversation; the slow average is
/// the baseline. Their difference drives the smoothed emotion label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectEma {
    pub fast_valence: f64,
    pub slow_valence: f64,
    pub fast_arousal: f64,
    pub slow_arousal: f64,
    /// Last update timestamp (epoch ms)
    pub last_update_ms: i64,
}

impl Default for AffectEma {
    fn default() -> Self {
        Self {
            fast_valence: 0.0,
            slow_valence: 0.0,
            fast_arousal: 0.0,
            slow_arousal: 0.0,
            last_update_ms: 0,
        }
    }
}

const FAST_ALPHA: f64 = 0.3;
const SLOW_ALPHA: f64 = 0.05;

impl AffectEma {
    /// Fold one observation into both averages.
    pub fn observe(&mut self, valence: f64, arousal: f64, now_ms: i64) {
        self.fast_valence = FAST_ALPHA * valence + (1.0 - FAST_ALPHA) * self.fast_valence;
        self.slow_valence = SLOW_ALPHA * valence + (1.0 - SLOW_ALPHA) * self.slow_valence;
        self.fast_arousal = FAST_ALPHA * arousal + (1.0 - FAST_ALPHA) * self.fast_arousal;
        self.slow_arousal = SLOW_ALPHA * arousal + (1.0 - SLOW_ALPHA) * self.slow_arousal;
        self.last_update_ms = now_ms;
    }
}

/// Smoothed affect snapshot derived from the EMA pair
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AffectState {
    /// Valence, -1.0 (negative) to 1.0 (positive)
    pub valence: f64,
    /// Arousal, 0.0 (calm) to 1.0 (activated)
    pub arousal: f64,
    /// Human-readable emotion label
    pub emotion: String,
    /// Goal-related signal extracted from recent messages, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_signal: Option<String>,
}

/// Map a (valence, arousal) point to a coarse emotion label.
pub fn emotion_label(valence: f64, arousal: f64) -> &'static str {
    match (valence, arousal) {
        (v, a) if v > 0.2 && a > 0.5 => "excited",
        (v, _) if v > 0.2 => "content",
        (v, a) if v < -0.2 && a > 0.5 => "stressed",
        (v, _) if v < -0.2 => "down",
        (_, a) if a > 0.6 => "activated",
        _ => "neutral",
    }
}

// Small valence/arousal lexicon for message-text analysis. Coverage is
// deliberately narrow: the EMA smoothing tolerates missed words.
const POSITIVE_WORDS: &[&str] = &[
    "love", "loves", "great", "awesome", "happy", "excited", "thanks", "thank", "good", "glad",
    "wonderful", "perfect", "nice", "fun", "enjoy", "enjoyed",
];

const NEGATIVE_WORDS: &[&str] = &[
    "hate", "hates", "awful", "terrible", "sad", "angry", "frustrated", "annoyed", "bad", "worried",
    "stressed", "tired", "upset", "anxious", "overwhelmed",
];

const AROUSAL_WORDS: &[&str] = &[
    "excited", "urgent", "asap", "now", "immediately", "angry", "furious", "thrilled", "panicking",
    "deadline", "stressed", "overwhelmed",
];

/// Lexicon-based affect estimate for a single message.
pub fn analyze_affect(text: &str) -> (f64, f64) {
    let tokens = crate::text::tokenize(text);
    if tokens.is_empty() {
        return (0.0, 0.0);
    }
    let mut positive = 0usize;
    let mut negative = 0usize;
    let mut aroused = 0usize;
    for token in &tokens {
        if POSITIVE_WORDS.contains(&token.as_str()) {
            positive += 1;
        }
        if NEGATIVE_WORDS.contains(&token.as_str()) {
            negative += 1;
        }
        if AROUSAL_WORDS.contains(&token.as_str()) {
            aroused += 1;
        }
    }
    let signal = (positive + negative) as f64;
    let valence = if signal == 0.0 {
        0.0
    } else {
        ((positive as f64 - negative as f64) / signal).clamp(-1.0, 1.0)
    };
    let arousal = (aroused as f64 / tokens.len() as f64 * 5.0).clamp(0.0, 1.0);
    (valence, arousal)
}

// ============================================================================
// RESPONSE PREFERENCES
// ============================================================================

/// Trust-derived response preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePreferences {
    /// Ratio of acted to fired proactive items over the recent window
    pub trust_score: f64,
    /// Dial position derived from the trust score (or manual override)
    pub proactiveness_dial: ProactivenessDial,
}

impl Default for ResponsePreferences {
    fn default() -> Self {
        Self {
            trust_score: 0.5,
            proactiveness_dial: ProactivenessDial::Moderate,
        }
    }
}

// ============================================================================
// BEHAVIORAL PATTERNS
// ============================================================================

/// Per-user behavioral record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralPatterns {
    /// Owning user identifier
    pub user_id: String,
    /// Smoothed messages per day
    pub daily_rate: f64,
    /// Daily rate at the previous observation window, for trend detection
    pub previous_daily_rate: f64,
    /// Fraction of sessions with more than a couple of exchanges
    pub session_engagement: f64,
    /// How often consecutive messages switch topic
    pub topic_switch_rate: f64,
    /// Average user message length in characters
    pub avg_response_length: f64,
    /// Hours of day (0..24, user-local) the user has recently been active in
    #[serde(default)]
    pub active_hours: Vec<u32>,
    /// Smoothed affect snapshot
    #[serde(default)]
    pub affect: AffectState,
    /// Raw EMA state behind the snapshot
    #[serde(default)]
    pub affect_ema: AffectEma,
    /// Trust score and proactiveness dial
    #[serde(default)]
    pub preferences: ResponsePreferences,
    /// IANA timezone name for quiet-hour computation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Completed session count, for trust cold-start
    pub completed_sessions: i64,
    /// Last update timestamp (epoch ms)
    pub updated_at_ms: i64,
}

impl BehavioralPatterns {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            daily_rate: 0.0,
            previous_daily_rate: 0.0,
            session_engagement: 0.0,
            topic_switch_rate: 0.0,
            avg_response_length: 0.0,
            active_hours: Vec::new(),
            affect: AffectState::default(),
            affect_ema: AffectEma::default(),
            preferences: ResponsePreferences::default(),
            timezone: None,
            completed_sessions: 0,
            updated_at_ms: 0,
        }
    }

    /// Fold one user message into the record.
    pub fn observe_message(&mut self, text: &str, local_hour: u32, now_ms: i64) {
        // Message frequency: EMA over a one-day bucket
        let elapsed_days = if self.updated_at_ms > 0 {
            ((now_ms - self.updated_at_ms).max(0)) as f64 / 86_400_000.0
        } else {
            1.0
        };
        let instantaneous = 1.0 / elapsed_days.max(1.0 / 96.0);
        self.previous_daily_rate = self.daily_rate;
        self.daily_rate = 0.2 * instantaneous + 0.8 * self.daily_rate;

        // Response length EMA
        self.avg_response_length = 0.2 * text.len() as f64 + 0.8 * self.avg_response_length;

        // Active hours: keep the most recent 48 observations, deduplicated
        self.active_hours.push(local_hour % 24);
        if self.active_hours.len() > 48 {
            let excess = self.active_hours.len() - 48;
            self.active_hours.drain(..excess);
        }

        // Affect
        let (valence, arousal) = analyze_affect(text);
        self.affect_ema.observe(valence, arousal, now_ms);
        self.affect.valence = self.affect_ema.fast_valence;
        self.affect.arousal = self.affect_ema.fast_arousal;
        self.affect.emotion =
            emotion_label(self.affect.valence, self.affect.arousal).to_string();

        self.updated_at_ms = now_ms;
    }

    /// Relative change of the daily rate against the previous window.
    /// Positive = speeding up, negative = slowing down.
    pub fn daily_rate_trend(&self) -> f64 {
        if self.previous_daily_rate <= f64::EPSILON {
            return 0.0;
        }
        (self.daily_rate - self.previous_daily_rate) / self.previous_daily_rate
    }

    /// Hours the user is most often active in, most frequent first.
    pub fn preferred_hours(&self) -> Vec<u32> {
        let mut counts = [0usize; 24];
        for hour in &self.active_hours {
            counts[(*hour % 24) as usize] += 1;
        }
        let mut hours: Vec<u32> = (0..24).filter(|h| counts[*h as usize] > 0).collect();
        hours.sort_by(|a, b| counts[*b as usize].cmp(&counts[*a as usize]));
        hours
    }
}

// ============================================================================
// TESTS
// ============================================================================
