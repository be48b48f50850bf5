//! Chat input helpers
//!
//! [`InputHistory`] recalls previously sent messages with up/down navigation
//! and keeps the half-typed draft. [`SuggestionEngine`] offers prefix
//! completions for short inputs; [`DebouncedSuggestions`] runs it after the
//! user pauses typing.

pub mod history;
pub mod suggest;

pub use history::{
    HistoryDirection, InputHistory, DEFAULT_HISTORY_MAX, DRAFT_INDEX, HISTORY_KEY,
};
pub use suggest::{
    DebouncedSuggestions, SuggestionEngine, DEFAULT_SUGGESTION_DEBOUNCE, SUGGESTION_LIMIT,
    SUGGESTION_MAX_INPUT,
};
