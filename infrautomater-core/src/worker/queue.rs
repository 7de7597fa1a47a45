//! In-process queue of provisioning and destruction jobs

use crossbeam_queue::SegQueue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Provision,
    Destroy,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Provision => f.write_str("provision"),
            JobKind::Destroy => f.write_str("destroy"),
        }
    }
}

/// One scheduled task attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub kind: JobKind,
    pub request_id: i64,
    /// 1-based attempt number
    pub attempt: u32,
    /// The job is not handed out before this instant
    pub not_before: Instant,
}

impl Job {
    pub fn new(kind: JobKind, request_id: i64) -> Self {
        Self {
            kind,
            request_id,
            attempt: 1,
            not_before: Instant::now(),
        }
    }

    /// The next attempt of this job, due after `delay`
    pub fn retry_after(&self, delay: Duration) -> Self {
        Self {
            kind: self.kind,
            request_id: self.request_id,
            attempt: self.attempt + 1,
            not_before: Instant::now() + delay,
        }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.not_before <= now
    }
}

/// Lock-free FIFO of jobs with delayed visibility
#[derive(Debug, Default)]
pub struct TaskQueue {
    jobs: SegQueue<Job>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue the first provisioning attempt for an approved request
    pub fn submit_provisioning(&self, request_id: i64) {
        tracing::debug!(request_id, "Provisioning submitted");
        self.push(Job::new(JobKind::Provision, request_id));
    }

    /// Enqueue a destruction attempt
    pub fn submit_destruction(&self, request_id: i64) {
        tracing::debug!(request_id, "Destruction submitted");
        self.push(Job::new(JobKind::Destroy, request_id));
    }

    pub fn push(&self, job: Job) {
        self.jobs.push(job);
    }

    /// Take the oldest job that is due, leaving delayed ones queued
    pub fn pop_ready(&self, now: Instant) -> Option<Job> {
        for _ in 0..self.jobs.len() {
            let job = self.jobs.pop()?;
            if job.is_ready(now) {
                return Some(job);
            }
            self.jobs.push(job);
        }
        None
    }

    /// Earliest instant at which some queued job becomes due
    pub fn next_due(&self) -> Option<Instant> {
        let mut earliest: Option<Instant> = None;
        for _ in 0..self.jobs.len() {
            let Some(job) = self.jobs.pop() else { break };
            earliest = Some(match earliest {
                Some(at) if at <= job.not_before => at,
                _ => job.not_before,
            });
            self.jobs.push(job);
        }
        earliest
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
