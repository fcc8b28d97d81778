//! Session data store (spec §5): everything fetched from the adapter that
//! outlives the request/response pair that produced it.
//!
//! `IndexMap` keeps insertion order so iterating threads, scopes or
//! breakpoints reflects arrival order rather than an arbitrary hash order,
//! the way the teacher orders its own DWARF-derived maps.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use itertools::Itertools;

use super::types::{Breakpoint, Module, Scope, Source, SourceKey, StackFrame, Thread, Variable};

/// A thread's run state as last reported by a `stopped`/`continued` event or
/// the initial `threads` fetch (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadRunState {
    Stopped,
    Continued,
    #[default]
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ThreadState {
    pub stack_frames: Option<Vec<StackFrame>>,
    pub scopes: IndexMap<i64, Vec<Scope>>,
    pub run_state: ThreadRunState,
    /// Whether the user has marked this thread eligible for broadcast
    /// stepping (spec glossary: "unlocked thread"). Threads start unlocked
    /// so the common single-thread case needs no setup.
    pub unlocked: bool,
}

impl Default for ThreadState {
    fn default() -> Self {
        Self {
            stack_frames: None,
            scopes: IndexMap::new(),
            run_state: ThreadRunState::default(),
            unlocked: true,
        }
    }
}

/// The two one-shot UI hints the response handler leaves for a front-end
/// after a step completes (spec §4.7: "mark UI intent 'scroll to active
/// line' and 'update active source'").
#[derive(Debug, Clone, Copy, Default)]
pub struct UiIntent {
    pub scroll_to_active_line: Option<i64>,
    pub update_active_source: bool,
}

/// Fetched source text plus the local wall-clock time it was fetched at
/// (spec §4.9: `sources_content` maps to `{ content, mtime }`). The DAP
/// `source` response carries no timestamp of its own, so `mtime` records
/// when *this client* retrieved it, letting a front-end tell stale content
/// apart from a fresh re-fetch after an `invalidated` event.
#[derive(Debug, Clone)]
pub struct SourceContent {
    pub content: String,
    pub mtime: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
    Telemetry,
    Important,
    Other,
}

#[derive(Debug, Clone)]
pub struct OutputLine {
    pub category: OutputCategory,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressEntry {
    pub progress_id: String,
    pub label: String,
    pub message: Option<String>,
    pub percentage: Option<f64>,
    pub done: bool,
}

/// Cap on how many progress entries are retained before the oldest
/// finished entry is evicted (spec §9 supplement: progress ring buffer).
const PROGRESS_RING_CAPACITY: usize = 64;

#[derive(Debug, Default)]
pub struct SessionDataStore {
    pub threads: IndexMap<i64, Thread>,
    pub thread_state: IndexMap<i64, ThreadState>,
    pub variables: IndexMap<i64, Vec<Variable>>,
    pub sources: IndexMap<SourceKey, Source>,
    pub sources_content: IndexMap<SourceKey, SourceContent>,
    pub breakpoints: IndexMap<String, Vec<Breakpoint>>,
    pub function_breakpoints: Vec<Breakpoint>,
    pub modules: IndexMap<String, Module>,
    pub output: Vec<OutputLine>,
    pub progress: IndexMap<String, ProgressEntry>,
    pub ui_intent: UiIntent,
}

impl SessionDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the thread list. Every listed thread gets a `thread_state`
    /// entry (creating one with the default `unlocked: true` if it doesn't
    /// already exist) so `unlocked_thread_ids` reflects the actual thread
    /// list right after a `threads` fetch, rather than only after some
    /// later per-thread fetch happens to touch `thread_state` (spec §4.9,
    /// §4.8 scenario 4).
    pub fn set_threads(&mut self, threads: Vec<Thread>) {
        let ids = threads.iter().map(|t| t.id).collect_vec();
        self.threads = threads.into_iter().map(|t| (t.id, t)).collect();
        self.thread_state.retain(|id, _| ids.contains(id));
        for id in ids {
            self.thread_state.entry(id).or_default();
        }
    }

    pub fn set_stack_trace(&mut self, thread_id: i64, frames: Vec<StackFrame>) {
        self.thread_state.entry(thread_id).or_default().stack_frames = Some(frames);
    }

    pub fn set_scopes(&mut self, frame_id: i64, thread_id: i64, scopes: Vec<Scope>) {
        self.thread_state
            .entry(thread_id)
            .or_default()
            .scopes
            .insert(frame_id, scopes);
    }

    pub fn set_variables(&mut self, variables_reference: i64, variables: Vec<Variable>) {
        self.variables.insert(variables_reference, variables);
    }

    pub fn set_source(&mut self, key: SourceKey, source: Source, content: Option<String>) {
        if let Some(content) = content {
            self.sources_content.insert(
                key.clone(),
                SourceContent {
                    content,
                    mtime: Utc::now(),
                },
            );
        }
        self.sources.insert(key, source);
    }

    pub fn set_breakpoints(&mut self, source_key: String, breakpoints: Vec<Breakpoint>) {
        self.breakpoints.insert(source_key, breakpoints);
    }

    pub fn push_output(&mut self, category: OutputCategory, text: String) {
        self.output.push(OutputLine { category, text });
    }

    pub fn upsert_progress(&mut self, entry: ProgressEntry) {
        let finish = entry.done;
        let id = entry.progress_id.clone();
        self.progress.insert(id, entry);
        if finish {
            self.evict_finished_progress_if_over_capacity();
        }
    }

    fn evict_finished_progress_if_over_capacity(&mut self) {
        while self.progress.len() > PROGRESS_RING_CAPACITY {
            let Some(oldest_done) = self
                .progress
                .iter()
                .find(|(_, entry)| entry.done)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            self.progress.shift_remove(&oldest_done);
        }
    }

    /// `invalidated` events with an `areas` entry of `variables` (or no
    /// `areas` at all) drop every cached variable reference so the next
    /// `variables` request re-fetches rather than serving stale state
    /// (spec §9 supplement).
    pub fn invalidate_variables(&mut self) {
        self.variables.clear();
        for state in self.thread_state.values_mut() {
            state.scopes.clear();
        }
    }

    pub fn invalidate_stacks(&mut self) {
        for state in self.thread_state.values_mut() {
            state.stack_frames = None;
        }
    }

    /// Thread ids currently marked unlocked, in thread-arrival order — the
    /// broadcast set `step` fans `next` out to (spec §4.8, glossary).
    pub fn unlocked_thread_ids(&self) -> Vec<i64> {
        self.thread_state
            .iter()
            .filter(|(_, state)| state.unlocked)
            .map(|(id, _)| *id)
            .collect_vec()
    }

    /// Explicit user operation: lock or unlock a thread for broadcast
    /// stepping (spec glossary: "a thread the user has marked as eligible").
    pub fn set_thread_unlocked(&mut self, thread_id: i64, unlocked: bool) {
        self.thread_state.entry(thread_id).or_default().unlocked = unlocked;
    }

    pub fn set_thread_run_state(&mut self, thread_id: i64, run_state: ThreadRunState) {
        self.thread_state.entry(thread_id).or_default().run_state = run_state;
    }

    pub fn set_all_threads_run_state(&mut self, run_state: ThreadRunState) {
        for state in self.thread_state.values_mut() {
            state.run_state = run_state;
        }
    }

    /// `thread` event with `reason: "exited"`: the thread is gone, drop both
    /// its summary and its retained stack/scope state.
    pub fn remove_thread(&mut self, thread_id: i64) {
        self.threads.shift_remove(&thread_id);
        self.thread_state.shift_remove(&thread_id);
    }

    pub fn mark_active_line(&mut self, thread_id: i64) {
        self.ui_intent.scroll_to_active_line = Some(thread_id);
        self.ui_intent.update_active_source = true;
    }

    /// One-shot read of the UI hints left by the last handled response,
    /// clearing them so a front-end doesn't re-act on the same step twice.
    pub fn take_ui_intent(&mut self) -> UiIntent {
        std::mem::take(&mut self.ui_intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_threads_drops_stale_thread_state() {
        let mut store = SessionDataStore::new();
        store.set_stack_trace(1, vec![]);
        store.set_threads(vec![Thread {
            id: 2,
            name: "main".into(),
        }]);
        assert!(!store.thread_state.contains_key(&1));
    }

    #[test]
    fn invalidate_variables_clears_cache_but_keeps_threads() {
        let mut store = SessionDataStore::new();
        store.set_threads(vec![Thread {
            id: 1,
            name: "main".into(),
        }]);
        store.set_variables(10, vec![]);
        store.invalidate_variables();
        assert!(store.variables.is_empty());
        assert!(store.threads.contains_key(&1));
    }

    #[test]
    fn set_source_stamps_content_with_a_fetch_time() {
        let mut store = SessionDataStore::new();
        let key = SourceKey::Path("/tmp/a.rs".to_string());
        store.set_source(key.clone(), Source::default(), Some("fn main() {}".into()));
        let fetched = store.sources_content.get(&key).unwrap();
        assert_eq!(fetched.content, "fn main() {}");
        assert!(fetched.mtime <= Utc::now());
    }

    #[test]
    fn progress_ring_evicts_oldest_finished_entry_over_capacity() {
        let mut store = SessionDataStore::new();
        for i in 0..PROGRESS_RING_CAPACITY + 1 {
            store.upsert_progress(ProgressEntry {
                progress_id: format!("p{i}"),
                label: "work".into(),
                message: None,
                percentage: None,
                done: true,
            });
        }
        assert_eq!(store.progress.len(), PROGRESS_RING_CAPACITY);
        assert!(!store.progress.contains_key("p0"));
    }

    /// A `threads` response alone (no per-thread fetch has happened yet)
    /// must already populate the broadcast set: `step` fans out to whatever
    /// `unlocked_thread_ids` reports immediately after a `threads` refresh,
    /// e.g. the one a `stopped { allThreadsStopped: true }` event triggers.
    #[test]
    fn set_threads_alone_populates_the_broadcast_set() {
        let mut store = SessionDataStore::new();
        store.set_threads(vec![
            Thread { id: 1, name: "main".into() },
            Thread { id: 2, name: "worker".into() },
        ]);
        assert_eq!(store.unlocked_thread_ids(), vec![1, 2]);
    }

    #[test]
    fn threads_start_unlocked_and_locking_excludes_from_broadcast() {
        let mut store = SessionDataStore::new();
        store.set_threads(vec![
            Thread { id: 1, name: "main".into() },
            Thread { id: 2, name: "worker".into() },
        ]);
        store.set_stack_trace(1, vec![]);
        store.set_stack_trace(2, vec![]);
        assert_eq!(store.unlocked_thread_ids(), vec![1, 2]);
        store.set_thread_unlocked(2, false);
        assert_eq!(store.unlocked_thread_ids(), vec![1]);
    }

    #[test]
    fn remove_thread_drops_summary_and_state() {
        let mut store = SessionDataStore::new();
        store.set_threads(vec![Thread { id: 1, name: "main".into() }]);
        store.set_stack_trace(1, vec![]);
        store.remove_thread(1);
        assert!(!store.threads.contains_key(&1));
        assert!(!store.thread_state.contains_key(&1));
    }

    #[test]
    fn mark_active_line_is_one_shot() {
        let mut store = SessionDataStore::new();
        store.mark_active_line(3);
        let intent = store.take_ui_intent();
        assert_eq!(intent.scroll_to_active_line, Some(3));
        assert!(intent.update_active_source);
        let cleared = store.take_ui_intent();
        assert_eq!(cleared.scroll_to_active_line, None);
    }
}
