//! Craft sessions: one crafting attempt and its frozen step history.
//!
//! A [`CraftSession`] is opened from the first [`CraftingInfo`] of an attempt.
//! Every accepted step overwrites the session's counters and appends a frozen
//! [`CraftStep`] (the display projection at that moment) to its history.
//!
//! # Lifecycle
//!
//! ```text
//! Active --(completed flag / repeated step number)--> Completed
//! Active --(failed flag / step number 0)-----------> Failed
//! ```
//!
//! Both terminal states are sticky: once set, a flag is never cleared. A
//! finished session still records every accepted step it receives, and
//! [`CraftSession::starts_new_attempt`] tells the caller when incoming info
//! belongs to a new attempt, which gets a new session.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use craftlog_state::craft::{CraftSession, CraftingInfo, Recipe};
//!
//! let info = CraftingInfo {
//!     recipe: Recipe { id: 1, durability: 70, difficulty: 100, quality: 500, ..Recipe::default() },
//!     step_num: 1,
//!     last_craft_action_id: 100001,
//!     last_craft_action_name: "Basic Synthesis".to_owned(),
//!     progress: 20,
//!     progress_delta: 20,
//!     durability: 60,
//!     durability_delta: -10,
//!     ..CraftingInfo::default()
//! };
//!
//! let created = Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap();
//! let mut session = CraftSession::new(&info, created);
//! session.apply_step(&info);
//!
//! assert_eq!(session.num_steps(), 1);
//! assert_eq!(session.info().progress, "20 / 100 (+20)");
//! assert_eq!(session.info().durability, "60 / 70 (-10)");
//! ```

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// The recipe being crafted. Captured once when a session opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: u32,
    pub name: String,
    pub recipe_level: u32,
    pub element: u32,
    #[serde(rename = "canHQ")]
    pub can_hq: bool,
    /// Progress required to finish.
    pub difficulty: u32,
    /// Maximum quality.
    pub quality: u32,
    /// Maximum durability.
    pub durability: u32,
}

/// One snapshot of the crafting window as reported by the stream channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CraftingInfo {
    pub recipe: Recipe,

    /// Id of the action that produced this step. `<= 0` means no actionable
    /// step has happened yet.
    #[serde(rename = "lastCraftActionID")]
    pub last_craft_action_id: i64,
    pub last_craft_action_name: String,
    pub step_num: u32,

    pub progress: i32,
    pub progress_delta: i32,

    pub quality: i32,
    pub quality_delta: i32,

    pub hq_chance: u32,

    pub durability: i32,
    pub durability_delta: i32,

    pub current_condition: u32,
    pub previous_condition: u32,

    #[serde(default)]
    pub reuse_proc: bool,

    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub failed: bool,
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Crafting condition, a modifier on the next action's effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Normal,
    Good,
    Excellent,
    Poor,
    Centered,
    Sturdy,
    Pliant,
    Malleable,
    Primed,
    /// A code this crate does not recognize.
    Unknown,
}

impl Condition {
    /// Map a game condition code. Unrecognized codes map to
    /// [`Condition::Unknown`] and are logged.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Normal,
            2 => Self::Good,
            3 => Self::Excellent,
            4 => Self::Poor,
            5 => Self::Centered,
            6 => Self::Sturdy,
            7 => Self::Pliant,
            8 => Self::Malleable,
            9 => Self::Primed,
            other => {
                tracing::warn!(code = other, "unrecognized crafting condition code");
                Self::Unknown
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
            Self::Poor => "Poor",
            Self::Centered => "Centered",
            Self::Sturdy => "Sturdy",
            Self::Pliant => "Pliant",
            Self::Malleable => "Malleable",
            Self::Primed => "Primed",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Format a counter delta with an explicit sign. Zero counts as non-negative.
pub fn delta_string(delta: i32) -> String {
    if delta >= 0 {
        format!("(+{delta})")
    } else {
        format!("({delta})")
    }
}

fn counter_string(current: i32, target: u32, delta: i32) -> String {
    format!("{current} / {target} {}", delta_string(delta))
}

// ---------------------------------------------------------------------------
// CraftStep
// ---------------------------------------------------------------------------

/// Human-readable projection of a session, frozen into the history on each
/// accepted step. Field names are the ones shown to (and exported for) the
/// user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CraftStep {
    #[serde(rename = "id")]
    pub id: String,
    pub completed: String,
    pub failed: String,

    #[serde(rename = "RecipeID")]
    pub recipe_id: u32,
    pub recipe_name: String,
    pub recipe_level: u32,
    pub step_num: u32,
    pub durability: String,
    pub progress: String,
    pub quality: String,
    #[serde(rename = "HQChance")]
    pub hq_chance: String,
    pub previous_condition: Condition,
    pub current_condition: Condition,
    pub last_craft_action: String,
    pub reuse_proc: String,
    #[serde(rename = "CP")]
    pub cp: String,
}

// ---------------------------------------------------------------------------
// CraftSession
// ---------------------------------------------------------------------------

/// One crafting attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftSession {
    created_at: DateTime<Utc>,
    recipe: Recipe,
    history: Vec<CraftStep>,

    step_num: u32,

    durability: i32,
    durability_delta: i32,

    progress: i32,
    progress_delta: i32,

    quality: i32,
    quality_delta: i32,
    hq_chance: u32,

    previous_condition: u32,
    current_condition: u32,

    last_craft_action_id: i64,
    last_craft_action_name: String,

    completed: bool,
    failed: bool,
    reuse_proc: bool,

    cp: u32,
    max_cp: u32,
}

impl CraftSession {
    /// Open a session from the first crafting info of an attempt.
    ///
    /// `created_at` is the session's permanent identity; see [`id`](Self::id).
    /// No step is recorded here; feed the same info to
    /// [`apply_step`](Self::apply_step) to record it.
    pub fn new(initial: &CraftingInfo, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            recipe: initial.recipe.clone(),
            history: Vec::new(),
            step_num: initial.step_num,
            durability: initial.durability,
            durability_delta: 0,
            progress: 0,
            progress_delta: 0,
            quality: 0,
            quality_delta: 0,
            hq_chance: 1,
            previous_condition: initial.previous_condition,
            current_condition: initial.current_condition,
            last_craft_action_id: 0,
            last_craft_action_name: String::new(),
            completed: false,
            failed: false,
            reuse_proc: false,
            cp: 0,
            max_cp: 0,
        }
    }

    /// Key for a session created at `created_at` (RFC 3339, millisecond
    /// precision, UTC).
    pub fn id_for(created_at: DateTime<Utc>) -> String {
        created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Apply one step of the crafting engine.
    ///
    /// Returns `true` if the step was accepted and appended to the history.
    /// Steps are ignored only when `last_craft_action_id <= 0`; every other
    /// step is recorded, including steps that arrive after the session has
    /// completed or failed.
    pub fn apply_step(&mut self, info: &CraftingInfo) -> bool {
        if info.last_craft_action_id <= 0 {
            tracing::debug!(
                session = %self.id(),
                step = info.step_num,
                "ignoring crafting info without an action"
            );
            return false;
        }

        let was_finished = self.is_finished();
        let repeated_step = self
            .history
            .last()
            .is_some_and(|prev| prev.step_num == info.step_num);

        self.step_num = info.step_num;

        self.durability = info.durability;
        self.durability_delta = info.durability_delta;

        self.progress = info.progress;
        self.progress_delta = info.progress_delta;

        self.quality = info.quality;
        self.quality_delta = info.quality_delta;

        self.hq_chance = info.hq_chance;

        self.previous_condition = info.previous_condition;
        self.current_condition = info.current_condition;

        self.last_craft_action_id = info.last_craft_action_id;
        self.last_craft_action_name = info.last_craft_action_name.clone();

        self.reuse_proc = info.reuse_proc;

        self.completed |= info.completed || repeated_step;
        self.failed |= info.failed || info.step_num == 0;

        let mut step = self.info();
        step.id = format!("{}#{}", step.id, self.history.len() + 1);
        self.history.push(step);

        if !was_finished && self.is_finished() {
            tracing::info!(
                session = %self.id(),
                completed = self.completed,
                failed = self.failed,
                steps = self.history.len(),
                "craft session finished"
            );
        }
        true
    }

    /// Whether `info` opens a new crafting attempt rather than continuing
    /// this one.
    ///
    /// Only a finished session can be superseded. It is superseded when the
    /// recipe changes, or when the step counter restarts at 1 from any other
    /// step.
    pub fn starts_new_attempt(&self, info: &CraftingInfo) -> bool {
        self.is_finished()
            && (info.recipe.id != self.recipe.id || (info.step_num == 1 && self.step_num != 1))
    }

    /// Record the character's current resource pool. Does not touch the
    /// crafting counters or the history.
    pub fn update_resource_pool(&mut self, cp: u32, max_cp: u32) {
        self.cp = cp;
        self.max_cp = max_cp;
    }

    // -- accessors ----------------------------------------------------------

    /// Stable key of this session, derived from its creation time.
    pub fn id(&self) -> String {
        Self::id_for(self.created_at)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Creation time in the local timezone, e.g. `1/25/2020 2:05:09 pm`.
    pub fn timestamp(&self) -> String {
        self.created_at
            .with_timezone(&Local)
            .format("%-m/%-d/%Y %-I:%M:%S %P")
            .to_string()
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Accepted steps, oldest first.
    pub fn history(&self) -> &[CraftStep] {
        &self.history
    }

    pub fn num_steps(&self) -> usize {
        self.history.len()
    }

    pub fn step_num(&self) -> u32 {
        self.step_num
    }

    pub fn condition(&self) -> Condition {
        Condition::from_code(self.current_condition)
    }

    pub fn last_craft_action_id(&self) -> i64 {
        self.last_craft_action_id
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.completed || self.failed
    }

    /// The resource pool as `"current / max"`.
    pub fn cp(&self) -> String {
        format!("{} / {}", self.cp, self.max_cp)
    }

    /// The display projection of the current state.
    pub fn info(&self) -> CraftStep {
        CraftStep {
            id: self.id(),
            completed: self.completed.to_string(),
            failed: self.failed.to_string(),
            recipe_id: self.recipe.id,
            recipe_name: self.recipe.name.clone(),
            recipe_level: self.recipe.recipe_level,
            step_num: self.step_num,
            durability: counter_string(
                self.durability,
                self.recipe.durability,
                self.durability_delta,
            ),
            progress: counter_string(self.progress, self.recipe.difficulty, self.progress_delta),
            quality: counter_string(self.quality, self.recipe.quality, self.quality_delta),
            hq_chance: format!("{}%", self.hq_chance),
            previous_condition: Condition::from_code(self.previous_condition),
            current_condition: Condition::from_code(self.current_condition),
            last_craft_action: format!(
                "{} ({})",
                self.last_craft_action_name, self.last_craft_action_id
            ),
            reuse_proc: self.reuse_proc.to_string(),
            cp: self.cp(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
