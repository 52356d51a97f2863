use std::collections::HashMap;

use cellar_core::{StateKind, StateResult, StateStore, StoreInspection};

/// Installs an `env_logger` logger that shows cellar's debug output unless
/// `RUST_LOG` says otherwise. Safe to call more than once.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("cellar_core=debug");
    let _ = env_logger::Builder::from_env(env)
        .is_test(cfg!(test))
        .try_init();
}

/// One key whose value differs between two captures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub key: String,
    pub before: String,
    pub after: String,
}

/// Text overlay of a store: one header line plus one line per key.
pub struct Hud {
    pub enabled: bool,
    pub highlighted: Option<String>,
    capture_count: u64,
    last: Option<StoreInspection>,
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

impl Hud {
    pub fn new() -> Self {
        Self {
            enabled: false,
            highlighted: None,
            capture_count: 0,
            last: None,
        }
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    pub fn set_highlighted(&mut self, key: Option<String>) {
        self.highlighted = key;
    }

    pub fn capture_count(&self) -> u64 {
        self.capture_count
    }

    /// Inspects `store`, returns the overlay lines, and remembers the result
    /// for the next [`Hud::changes`].
    pub fn capture(&mut self, store: &StateStore) -> StateResult<Vec<String>> {
        let report = store.inspect()?;
        self.capture_count += 1;

        let consumers: usize = report.keys.iter().map(|k| k.consumers).sum();
        let mut lines = vec![[
            format!("capture: {}", self.capture_count),
            format!("keys: {}", report.keys.len()),
            format!("consumers: {consumers}"),
        ]
        .join("  |  ")];

        for k in &report.keys {
            let marker = if self.highlighted.as_deref() == Some(k.key.as_str()) {
                '>'
            } else {
                ' '
            };
            let kind = match (&k.kind, &k.token) {
                (StateKind::Local, _) => "local".to_string(),
                (StateKind::Remote, Some(token)) => format!("remote:{token}"),
                (StateKind::Remote, None) => "remote".to_string(),
            };
            let mut line = format!(
                "{marker} {} [{kind}] = {}  consumers={} listeners={}",
                k.key, k.value, k.consumers, k.subscribers
            );
            if k.closed {
                line.push_str(" (closed)");
            }
            lines.push(line);
        }

        self.last = Some(report);
        Ok(lines)
    }

    /// Keys whose value changed between the last capture and now.
    pub fn changes(&self, store: &StateStore) -> StateResult<Vec<Change>> {
        let now = store.inspect()?;
        let Some(last) = &self.last else {
            return Ok(Vec::new());
        };
        let before: HashMap<&str, &str> = last
            .keys
            .iter()
            .map(|k| (k.key.as_str(), k.value.as_str()))
            .collect();
        let changes = now
            .keys
            .iter()
            .filter_map(|k| {
                let prev = before.get(k.key.as_str())?;
                (*prev != k.value).then(|| Change {
                    key: k.key.clone(),
                    before: prev.to_string(),
                    after: k.value.clone(),
                })
            })
            .collect::<Vec<_>>();
        for c in &changes {
            log::debug!("{}: {} -> {}", c.key, c.before, c.after);
        }
        Ok(changes)
    }
}

pub struct Inspector {
    pub hud: Hud,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    pub fn new() -> Self {
        Self { hud: Hud::new() }
    }

    /// Overlay lines for `store` while the inspector is enabled, nothing
    /// otherwise.
    pub fn frame(&mut self, store: &StateStore) -> StateResult<Vec<String>> {
        if !self.hud.enabled {
            return Ok(Vec::new());
        }
        let lines = self.hud.capture(store)?;
        for line in &lines {
            log::debug!("{line}");
        }
        Ok(lines)
    }
}
