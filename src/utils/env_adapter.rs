use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Process environment access for configuration overrides. Mutation is
/// `unsafe` under edition 2024 and goes through one lock.
pub struct EnvAdapter;

impl EnvAdapter {
    /// Value of `key` when it is set to something other than whitespace.
    pub fn override_value(key: &str) -> Option<String> {
        let _guard = env_lock();
        std::env::var(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn set_var(key: &str, value: &str) {
        let _guard = env_lock();
        unsafe {
            std::env::set_var(key, value);
        }
    }

    pub fn remove_var(key: &str) {
        let _guard = env_lock();
        unsafe {
            std::env::remove_var(key);
        }
    }
}

/// Sets or clears variables for the lifetime of the guard and restores the
/// previous values on drop.
pub struct ScopedEnv {
    saved: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    pub fn new() -> Self {
        Self { saved: Vec::new() }
    }

    fn remember(&mut self, key: &str) {
        if self.saved.iter().any(|(saved, _)| saved == key) {
            return;
        }
        self.saved.push((key.to_string(), std::env::var(key).ok()));
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.remember(key);
        EnvAdapter::set_var(key, value);
        self
    }

    pub fn unset(&mut self, key: &str) -> &mut Self {
        self.remember(key);
        EnvAdapter::remove_var(key);
        self
    }
}

impl Default for ScopedEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => EnvAdapter::set_var(&key, &value),
                None => EnvAdapter::remove_var(&key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEY: &str = "GITGYM_TEST_ENV_ADAPTER";

    #[test]
    #[serial]
    fn blank_values_are_not_overrides() {
        let mut env = ScopedEnv::new();
        env.set(KEY, "   ");
        assert_eq!(EnvAdapter::override_value(KEY), None);

        env.set(KEY, " /srv/gitgym ");
        assert_eq!(
            EnvAdapter::override_value(KEY).as_deref(),
            Some("/srv/gitgym")
        );
    }

    #[test]
    #[serial]
    fn scoped_env_restores_previous_values() {
        EnvAdapter::set_var(KEY, "outer");
        {
            let mut env = ScopedEnv::new();
            env.set(KEY, "inner").set(KEY, "again");
            assert_eq!(std::env::var(KEY).unwrap(), "again");
        }
        assert_eq!(std::env::var(KEY).unwrap(), "outer");

        {
            let mut env = ScopedEnv::new();
            env.unset(KEY);
            assert!(std::env::var(KEY).is_err());
        }
        assert_eq!(std::env::var(KEY).unwrap(), "outer");
        EnvAdapter::remove_var(KEY);
    }
}
