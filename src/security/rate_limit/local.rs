//! Process-local fixed-window limiter keyed by client IP.
//!
//! A window starts on a client's first request and resets on the first
//! request after it expires. A burst straddling a window edge can admit up to
//! twice the limit; that approximation is accepted.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Request accounting for one client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Client {
    pub request_count: u32,
    pub expires_at: Instant,
}

pub type ClientMap = HashMap<String, Client>;

#[derive(Debug)]
pub struct LocalRateLimiter {
    clients: Mutex<ClientMap>,
    requests: u32,
    window: Duration,
}

impl LocalRateLimiter {
    pub fn new(requests: u32, window: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            requests,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request from `client_ip` and report whether it is within the limit.
    pub fn allowed(&self, client_ip: &str) -> bool {
        self.allowed_at(client_ip, Instant::now())
    }

    pub(crate) fn allowed_at(&self, client_ip: &str, now: Instant) -> bool {
        let count = {
            let mut clients = self.lock();
            let fresh = Client {
                request_count: 0,
                expires_at: now + self.window,
            };
            match clients.get_mut(client_ip) {
                Some(client) => {
                    if now > client.expires_at {
                        *client = fresh;
                    }
                    client.request_count = client.request_count.saturating_add(1);
                    client.request_count
                }
                None => {
                    clients.insert(
                        client_ip.to_string(),
                        Client {
                            request_count: 1,
                            ..fresh
                        },
                    );
                    1
                }
            }
        };

        count <= self.requests
    }

    /// Remove entries whose window has expired. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, client| now <= client.expires_at);
        before - clients.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn client(&self, client_ip: &str) -> Option<Client> {
        self.lock().get(client_ip).copied()
    }

    // Every update is a single assignment, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, ClientMap> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn rejects_request_over_limit_within_window() {
        let limiter = LocalRateLimiter::new(3, WINDOW);
        let start = Instant::now();

        for i in 0..3 {
            assert!(limiter.allowed_at("10.0.0.1", start + Duration::from_secs(i)));
        }
        assert!(!limiter.allowed_at("10.0.0.1", start + Duration::from_secs(5)));
        // Other clients have their own window.
        assert!(limiter.allowed_at("10.0.0.2", start + Duration::from_secs(5)));
    }

    #[test]
    fn window_expiry_resets_count() {
        let limiter = LocalRateLimiter::new(3, WINDOW);
        let start = Instant::now();

        for _ in 0..4 {
            limiter.allowed_at("10.0.0.1", start);
        }
        assert!(!limiter.allowed_at("10.0.0.1", start + WINDOW));

        let later = start + WINDOW + Duration::from_millis(1);
        assert!(limiter.allowed_at("10.0.0.1", later));
        let client = limiter.client("10.0.0.1").unwrap();
        assert_eq!(client.request_count, 1);
        assert_eq!(client.expires_at, later + WINDOW);
    }

    #[test]
    fn concurrent_requests_never_exceed_limit() {
        const LIMIT: u32 = 50;
        let limiter = Arc::new(LocalRateLimiter::new(LIMIT, WINDOW));
        let admitted = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..(2 * LIMIT) {
                let limiter = limiter.clone();
                let admitted = admitted.clone();
                scope.spawn(move || {
                    if limiter.allowed("10.0.0.1") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), LIMIT as usize);
        assert_eq!(limiter.client("10.0.0.1").unwrap().request_count, 2 * LIMIT);
    }

    #[test]
    fn sweep_drops_only_expired_clients() {
        let limiter = LocalRateLimiter::new(3, WINDOW);
        let start = Instant::now();
        limiter.allowed_at("old", start);
        limiter.allowed_at("new", start + Duration::from_secs(30));

        assert_eq!(limiter.sweep_expired_at(start + Duration::from_secs(61)), 1);
        assert_eq!(limiter.len(), 1);
        assert!(limiter.client("new").is_some());
    }
}
