//! Scripted sentinels shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ledger_sentinel_domain::{
    ArtifactId, ArtifactTypeId, BlockId, ConfigDef, Criteria, Ledger, Settings,
};

use crate::sentinel::{Sentinel, SentinelError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub block_id: BlockId,
    pub criteria: Criteria,
}

pub(crate) type Calls = Arc<Mutex<Vec<Call>>>;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Reply {
    Advance,
    OptOut,
    Fail,
    Panic,
    Invalid,
}

pub(crate) struct ScriptedSentinel {
    initial: Criteria,
    reply: Reply,
    calls: Calls,
    delay: Option<Duration>,
}

impl ScriptedSentinel {
    pub fn new(reply: Reply) -> (Self, Calls) {
        let calls = Calls::default();
        (Self::recording_into(reply, calls.clone()), calls)
    }

    /// Appends every notification to an existing log.
    pub fn recording_into(reply: Reply, calls: Calls) -> Self {
        Self {
            initial: Criteria::with_latest_block_id(BlockId::ROOT),
            reply,
            calls,
            delay: None,
        }
    }

    pub fn with_initial(mut self, criteria: Criteria) -> Self {
        self.initial = criteria;
        self
    }

    /// Sleeps inside `notify` before recording the call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn boxed(self) -> Box<dyn Sentinel> {
        Box::new(self)
    }
}

pub(crate) fn recorded(calls: &Calls) -> Vec<Call> {
    calls.lock().unwrap().clone()
}

#[async_trait]
impl Sentinel for ScriptedSentinel {
    fn config(&self) -> ConfigDef {
        ConfigDef::default()
    }

    async fn start(
        &mut self,
        _settings: &Settings,
        _ledger: Arc<dyn Ledger>,
    ) -> Result<Criteria, SentinelError> {
        Ok(self.initial.clone())
    }

    async fn notify(
        &mut self,
        latest_block_id: BlockId,
        criteria: &Criteria,
    ) -> Result<Option<Criteria>, SentinelError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(Call {
            block_id: latest_block_id,
            criteria: criteria.clone(),
        });
        match self.reply {
            Reply::Advance => Ok(criteria.with_block_id(Some(latest_block_id))),
            Reply::OptOut => Ok(None),
            Reply::Fail => Err(SentinelError::failed("scripted failure")),
            Reply::Panic => panic!("scripted panic"),
            Reply::Invalid => Ok(Some(
                Criteria::with_latest_block_id(latest_block_id)
                    .for_artifact(ArtifactId::random())
                    .for_artifact_type(ArtifactTypeId::random()),
            )),
        }
    }
}
