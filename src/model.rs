//! Time-indexed model of processes and their USS, one tick per block

use crate::block::Block;
use crate::protocol::{Event, EventKind};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// One process as seen by the client. `samples[i]` is the USS in MB at tick
/// `start_tick + i`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub name: Option<String>,
    pub samples: Vec<f64>,
    pub start_tick: u64,
    pub stopped: bool,
    pub stop_tick: Option<u64>,
}

impl ProcessRecord {
    fn new(pid: u32, tick: u64, uss_mb: f64) -> Self {
        Self {
            pid,
            ppid: None,
            name: None,
            samples: vec![uss_mb],
            start_tick: tick,
            stopped: false,
            stop_tick: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.stopped
    }

    pub fn last_sample(&self) -> Option<f64> {
        self.samples.last().copied()
    }

    /// Tick of the newest sample. `None` for a process that started and
    /// stopped within the same tick.
    pub fn latest_tick(&self) -> Option<u64> {
        let len = self.samples.len() as u64;
        (len > 0).then(|| self.start_tick + len - 1)
    }

    /// `(tick, MB)` pairs in tick order.
    pub fn series(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        (self.start_tick..).zip(self.samples.iter().copied())
    }

    pub fn peak_mb(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("?")
    }
}

/// Pids touched by one applied block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickDelta {
    pub tick: u64,
    pub started: Vec<u32>,
    pub updated: Vec<u32>,
    pub renamed: Vec<u32>,
    pub stopped: Vec<u32>,
}

impl TickDelta {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
            && self.updated.is_empty()
            && self.renamed.is_empty()
            && self.stopped.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessModel {
    tick: u64,
    records: BTreeMap<u32, ProcessRecord>,
}

impl ProcessModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    /// All records, stopped ones included, ordered by pid.
    pub fn records(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }

    pub fn active(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values().filter(|r| r.is_active())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_active_mb(&self) -> f64 {
        self.active().filter_map(ProcessRecord::last_sample).sum()
    }

    pub fn peak_mb(&self) -> Option<f64> {
        self.records().filter_map(ProcessRecord::peak_mb).reduce(f64::max)
    }

    /// Advances one tick and applies the block's events in order.
    ///
    /// Every active series first repeats its last sample so its length tracks
    /// the tick; `update` then overwrites that sample and `old` removes it,
    /// freezing the series at the last tick the process was alive.
    pub fn apply(&mut self, block: &Block) -> TickDelta {
        self.tick += 1;
        let tick = self.tick;

        for record in self.records.values_mut().filter(|r| !r.stopped) {
            if let Some(last) = record.last_sample() {
                record.samples.push(last);
            }
        }

        let mut delta = TickDelta {
            tick,
            ..TickDelta::default()
        };
        for event in block.iter() {
            match event.kind {
                EventKind::New => self.apply_new(event, &mut delta),
                EventKind::Update => self.apply_update(event, &mut delta),
                EventKind::Old => self.apply_old(event, &mut delta),
            }
        }
        delta
    }

    fn apply_new(&mut self, event: &Event, delta: &mut TickDelta) {
        let (Some(pid), Some(uss_mb)) = (event.pid(), event.uss_mb()) else {
            debug!("Ignoring malformed event: {}", event);
            return;
        };
        if self.records.contains_key(&pid) {
            return;
        }
        let mut record = ProcessRecord::new(pid, self.tick, uss_mb);
        record.ppid = event.ppid();
        record.name = event.name().map(str::to_string);
        debug!("[new pid {} ({}) uss {:.3} MB]", pid, record.display_name(), uss_mb);
        self.records.insert(pid, record);
        delta.started.push(pid);
    }

    fn apply_update(&mut self, event: &Event, delta: &mut TickDelta) {
        let (Some(pid), Some(uss_mb)) = (event.pid(), event.uss_mb()) else {
            debug!("Ignoring malformed event: {}", event);
            return;
        };
        let Some(record) = self.records.get_mut(&pid).filter(|r| !r.stopped) else {
            return;
        };
        if let Some(last) = record.samples.last_mut() {
            *last = uss_mb;
        }
        delta.updated.push(pid);
        if let Some(name) = event.name() {
            if record.name.as_deref() != Some(name) {
                debug!("[rename pid {} {} -> {}]", pid, record.display_name(), name);
                record.name = Some(name.to_string());
                delta.renamed.push(pid);
            }
        }
    }

    fn apply_old(&mut self, event: &Event, delta: &mut TickDelta) {
        let Some(pid) = event.pid() else {
            debug!("Ignoring malformed event: {}", event);
            return;
        };
        let tick = self.tick;
        let Some(record) = self.records.get_mut(&pid).filter(|r| !r.stopped) else {
            return;
        };
        record.samples.pop();
        record.stopped = true;
        record.stop_tick = Some(tick);
        debug!("[old pid {} ({}) after {} samples]", pid, record.display_name(), record.samples.len());
        delta.stopped.push(pid);
    }
}
