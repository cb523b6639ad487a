//! Store doubles for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use crate::storage::{Script, Store, StoreError, with_timeout};

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub script: Script,
    pub timeout: Duration,
    pub keys: Vec<String>,
    pub values: Vec<i64>,
}

/// Answers every script with a fixed reply and remembers how it was called.
pub(crate) struct RecordingStore {
    reply: Option<i64>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingStore {
    pub fn replying(reply: Option<i64>) -> Self {
        Self {
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl Store for RecordingStore {
    async fn eval(
        &self,
        script: Script,
        timeout: Duration,
        keys: &[&str],
        values: &[i64],
    ) -> Result<Option<i64>, StoreError> {
        self.calls.lock().unwrap().push(Call {
            script,
            timeout,
            keys: keys.iter().map(|key| key.to_string()).collect(),
            values: values.to_vec(),
        });

        Ok(self.reply)
    }
}

pub(crate) enum Fault {
    Unreachable,
    Slow(Duration),
}

/// A store that never produces an answer.
pub(crate) struct FaultyStore {
    fault: Fault,
}

impl FaultyStore {
    pub fn new(fault: Fault) -> Self {
        Self { fault }
    }
}

impl Store for FaultyStore {
    async fn eval(
        &self,
        _: Script,
        timeout: Duration,
        _: &[&str],
        _: &[i64],
    ) -> Result<Option<i64>, StoreError> {
        match self.fault {
            Fault::Unreachable => Err(StoreError::Connection("Connection refused".to_string())),
            Fault::Slow(delay) => {
                with_timeout(timeout, async {
                    tokio::time::sleep(delay).await;
                    Ok(Some(1))
                })
                .await
            }
        }
    }
}
