//! Endpoint Security Gate - Scrape Request Authorization
//!
//! Authorizes each scrape request through a fixed validation sequence:
//! blocked-IP table, allow-list (exact/wildcard/CIDR), optional
//! bearer-style auth presence, and User-Agent sanity checks. Tracks a
//! per-(client, endpoint) one-minute rate-limit window, temporarily
//! blocks IPs that fail the allow-list, and records an immutable audit
//! entry for every access attempt.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::domain::ip_filter::IpAllowList;

/// Length of one rate-limit window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Windows untouched for this long are dropped by the sweep.
const STALE_WINDOW_AGE: Duration = Duration::from_secs(120);

/// User-Agent fragments treated as suspicious.
const SUSPICIOUS_AGENT_MARKERS: [&str; 4] = ["bot", "crawler", "spider", "scraper"];

/// How many recent audit entries are retained in memory.
const AUDIT_RING_CAPACITY: usize = 256;

/// Which validation step produced the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationType {
  IpAddress,
  Authentication,
  Headers,
  Authorization,
}

/// Outcome of the validation sequence. Denials are values, not errors;
/// the HTTP layer maps them onto response codes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityValidationResult {
  pub is_valid: bool,
  pub reason: Option<String>,
  pub validation_type: ValidationType,
  pub client_ip: String,
  pub context: Vec<(String, String)>,
}

impl SecurityValidationResult {
  fn allowed(client_ip: String) -> Self {
    Self {
      is_valid: true,
      reason: None,
      validation_type: ValidationType::Authorization,
      client_ip,
      context: Vec::new(),
    }
  }

  fn denied(
    validation_type: ValidationType,
    client_ip: String,
    reason: impl Into<String>,
  ) -> Self {
    Self {
      is_valid: false,
      reason: Some(reason.into()),
      validation_type,
      client_ip,
      context: Vec::new(),
    }
  }

  fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
    self.context.push((key.to_string(), value.into()));
    self
  }
}

/// Transport-agnostic view of one inbound scrape request.
#[derive(Debug, Clone, Default)]
pub struct AccessRequest {
  /// Endpoint path being scraped.
  pub endpoint: String,
  /// Raw `X-Forwarded-For` header value.
  pub forwarded_for: Option<String>,
  /// Raw `X-Real-IP` header value.
  pub real_ip: Option<String>,
  /// Raw `Authorization` header value.
  pub authorization: Option<String>,
  /// Raw `User-Agent` header value.
  pub user_agent: Option<String>,
}

impl AccessRequest {
  /// Resolve the client IP: first `X-Forwarded-For` entry, then
  /// `X-Real-IP`, then `"unknown"`.
  pub fn client_ip(&self) -> String {
    if let Some(forwarded) = &self.forwarded_for {
      if let Some(first) = forwarded.split(',').next() {
        let first = first.trim();
        if !first.is_empty() {
          return first.to_string();
        }
      }
    }
    if let Some(real) = &self.real_ip {
      let real = real.trim();
      if !real.is_empty() {
        return real.to_string();
      }
    }
    "unknown".to_string()
  }
}

/// Immutable audit record of one scrape attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AccessAttempt {
  pub correlation_id: Uuid,
  pub client_ip: String,
  pub endpoint: String,
  pub authorized: bool,
  pub reason: Option<String>,
  pub user_agent: Option<String>,
  pub duration_us: u64,
  pub occurred_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RateLimitWindow {
  request_count: u32,
  window_start: Instant,
}

#[derive(Debug)]
struct BlockedIpEntry {
  blocked_until: Instant,
}

/// The security gate guarding the scrape endpoint.
pub struct EndpointSecurityGate {
  enabled: bool,
  require_authentication: bool,
  enable_rate_limiting: bool,
  enable_header_checks: bool,
  log_security_events: bool,
  max_requests_per_minute: u32,
  block_duration: Duration,
  sweep_interval: Duration,
  allow_list: IpAllowList,
  rate_windows: Mutex<HashMap<(String, String), RateLimitWindow>>,
  blocked: Mutex<HashMap<String, BlockedIpEntry>>,
  audit: Mutex<VecDeque<AccessAttempt>>,
}

impl EndpointSecurityGate {
  /// Build a gate from configuration; fails on unparseable patterns.
  pub fn new(config: &SecurityConfig) -> anyhow::Result<Self> {
    Ok(Self {
      enabled: config.enable_security,
      require_authentication: config.require_authentication,
      enable_rate_limiting: config.enable_rate_limiting,
      enable_header_checks: config.enable_security_headers,
      log_security_events: config.log_security_events,
      max_requests_per_minute: config.max_requests_per_minute,
      block_duration: Duration::from_secs(config.ip_block_duration_seconds),
      sweep_interval: Duration::from_secs(config.cleanup_interval_seconds),
      allow_list: IpAllowList::parse(&config.allowed_ips)?,
      rate_windows: Mutex::new(HashMap::new()),
      blocked: Mutex::new(HashMap::new()),
      audit: Mutex::new(VecDeque::with_capacity(AUDIT_RING_CAPACITY)),
    })
  }

  /// Run the validation sequence for one request.
  pub fn validate_request(&self, request: &AccessRequest) -> SecurityValidationResult {
    // 1. Security disabled: everything passes.
    if !self.enabled {
      return SecurityValidationResult::allowed(request.client_ip());
    }

    // 2. Resolve the client address.
    let client_ip = request.client_ip();

    // 3. Currently blocked?
    if self.is_blocked(&client_ip) {
      let result = SecurityValidationResult::denied(
        ValidationType::IpAddress,
        client_ip,
        "IP address is blocked",
      );
      self.log_denial(&result, &request.endpoint);
      return result;
    }

    // 4. Allow-list check; a miss blocks the address.
    if !self.allow_list.is_empty() && !self.allow_list.matches(&client_ip) {
      self.block_ip(&client_ip);
      let result = SecurityValidationResult::denied(
        ValidationType::IpAddress,
        client_ip,
        "IP address not in allow list",
      )
      .with_context("blocked_for_seconds", self.block_duration.as_secs().to_string());
      self.log_denial(&result, &request.endpoint);
      return result;
    }

    // 5. Authentication presence.
    if self.require_authentication
      && request
        .authorization
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .is_empty()
    {
      let result = SecurityValidationResult::denied(
        ValidationType::Authentication,
        client_ip,
        "Missing Authorization header",
      );
      self.log_denial(&result, &request.endpoint);
      return result;
    }

    // 6. User-Agent sanity.
    if self.enable_header_checks {
      match request.user_agent.as_deref().map(str::trim) {
        None | Some("") => {
          let result = SecurityValidationResult::denied(
            ValidationType::Headers,
            client_ip,
            "Missing User-Agent header",
          );
          self.log_denial(&result, &request.endpoint);
          return result;
        }
        Some(agent) => {
          let lowered = agent.to_ascii_lowercase();
          if let Some(marker) = SUSPICIOUS_AGENT_MARKERS
            .iter()
            .find(|m| lowered.contains(**m))
          {
            let result = SecurityValidationResult::denied(
              ValidationType::Headers,
              client_ip,
              "Suspicious User-Agent",
            )
            .with_context("marker", *marker);
            self.log_denial(&result, &request.endpoint);
            return result;
          }
        }
      }
    }

    // 7. All checks passed.
    SecurityValidationResult::allowed(client_ip)
  }

  /// Fixed one-minute window rate limiting keyed by (client, endpoint).
  ///
  /// Returns true once the window's count exceeds the configured
  /// per-minute threshold; an expired window resets the count to 1.
  pub fn should_rate_limit(&self, client_ip: &str, endpoint: &str) -> bool {
    if !self.enabled || !self.enable_rate_limiting {
      return false;
    }

    let key = (client_ip.to_string(), endpoint.to_string());
    let mut windows = self.rate_windows.lock().expect("rate-limit table poisoned");
    let now = Instant::now();

    let window = windows.entry(key).or_insert(RateLimitWindow {
      request_count: 0,
      window_start: now,
    });

    if now.duration_since(window.window_start) >= RATE_WINDOW {
      window.request_count = 1;
      window.window_start = now;
      return false;
    }

    window.request_count += 1;
    let limited = window.request_count > self.max_requests_per_minute;
    if limited && self.log_security_events {
      warn!(
        client_ip,
        endpoint,
        count = window.request_count,
        limit = self.max_requests_per_minute,
        "Rate limit exceeded"
      );
    }
    limited
  }

  /// Record an immutable audit entry for one scrape attempt.
  pub fn record_access_attempt(
    &self,
    request: &AccessRequest,
    result: &SecurityValidationResult,
    duration: Duration,
  ) -> AccessAttempt {
    let attempt = AccessAttempt {
      correlation_id: Uuid::new_v4(),
      client_ip: result.client_ip.clone(),
      endpoint: request.endpoint.clone(),
      authorized: result.is_valid,
      reason: result.reason.clone(),
      user_agent: request.user_agent.clone(),
      duration_us: duration.as_micros() as u64,
      occurred_at: Utc::now(),
    };

    info!(
      correlation_id = %attempt.correlation_id,
      client_ip = %attempt.client_ip,
      endpoint = %attempt.endpoint,
      authorized = attempt.authorized,
      duration_us = attempt.duration_us,
      "Scrape access attempt"
    );

    let mut ring = self.audit.lock().expect("audit ring poisoned");
    if ring.len() == AUDIT_RING_CAPACITY {
      ring.pop_front();
    }
    ring.push_back(attempt.clone());
    attempt
  }

  /// Recent audit entries, oldest first.
  pub fn recent_attempts(&self) -> Vec<AccessAttempt> {
    self
      .audit
      .lock()
      .expect("audit ring poisoned")
      .iter()
      .cloned()
      .collect()
  }

  /// Whether an address is currently blocked.
  pub fn is_blocked(&self, client_ip: &str) -> bool {
    let blocked = self.blocked.lock().expect("block table poisoned");
    blocked
      .get(client_ip)
      .is_some_and(|entry| Instant::now() < entry.blocked_until)
  }

  fn block_ip(&self, client_ip: &str) {
    let mut blocked = self.blocked.lock().expect("block table poisoned");
    blocked.insert(
      client_ip.to_string(),
      BlockedIpEntry {
        blocked_until: Instant::now() + self.block_duration,
      },
    );
    if self.log_security_events {
      warn!(
        client_ip,
        duration_seconds = self.block_duration.as_secs(),
        "IP address blocked"
      );
    }
  }

  fn log_denial(&self, result: &SecurityValidationResult, endpoint: &str) {
    if self.log_security_events {
      warn!(
        client_ip = %result.client_ip,
        endpoint,
        validation_type = ?result.validation_type,
        reason = result.reason.as_deref().unwrap_or(""),
        "Scrape request denied"
      );
    }
  }

  /// Drop stale rate windows and expired block entries.
  pub fn cleanup_expired(&self) -> (usize, usize) {
    let now = Instant::now();

    let mut windows = self.rate_windows.lock().expect("rate-limit table poisoned");
    let windows_before = windows.len();
    windows.retain(|_, w| now.duration_since(w.window_start) < STALE_WINDOW_AGE);
    let windows_removed = windows_before - windows.len();
    drop(windows);

    let mut blocked = self.blocked.lock().expect("block table poisoned");
    let blocked_before = blocked.len();
    blocked.retain(|ip, entry| {
      let keep = now < entry.blocked_until;
      if !keep {
        info!(client_ip = %ip, "IP address unblocked");
      }
      keep
    });
    let blocks_removed = blocked_before - blocked.len();

    (windows_removed, blocks_removed)
  }

  /// Spawn the periodic security-cache sweep.
  pub fn spawn_cleanup_sweep(
    self: Arc<Self>,
    mut shutdown_rx: broadcast::Receiver<()>,
  ) -> JoinHandle<()> {
    let gate = self;
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(gate.sweep_interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      ticker.tick().await;
      loop {
        tokio::select! {
          _ = shutdown_rx.recv() => {
            debug!("Security sweep stopping");
            break;
          }
          _ = ticker.tick() => {
            let (windows, blocks) = gate.cleanup_expired();
            if windows > 0 || blocks > 0 {
              debug!(windows, blocks, "Security sweep cleaned entries");
            }
          }
        }
      }
    })
  }
}
