// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Lab switch session. A scenario holds at most one, and it is closed on every exit path.

use async_trait::async_trait;
use config::env::SwitchCredentials;
#[allow(unused)]
use tracing::{debug, info, warn};

use crate::error::ScenarioError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum InterfaceState {
    Up,
    Down,
}

/// An open session to the external switch
#[async_trait]
pub trait LabSwitch: Send + Sync {
    /// Enable or disable the given switch ports and commit
    async fn set_interfaces_state(
        &mut self,
        interfaces: &[String],
        state: InterfaceState,
    ) -> Result<(), ScenarioError>;

    async fn close(&mut self) -> Result<(), ScenarioError>;
}

/// Opens switch sessions from credentials
#[async_trait]
pub trait SwitchConnector: Send + Sync {
    async fn connect(&self, credentials: &SwitchCredentials) -> Result<Box<dyn LabSwitch>, ScenarioError>;
}

/// The one switch session of a scenario
#[derive(Default)]
pub struct SwitchSlot {
    session: Option<Box<dyn LabSwitch>>,
}

impl SwitchSlot {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Open a session unless one is already open and return it
    pub async fn open(
        &mut self,
        connector: &dyn SwitchConnector,
        credentials: &SwitchCredentials,
    ) -> Result<&mut dyn LabSwitch, ScenarioError> {
        if self.session.is_none() {
            info!(
                "Opening switch session to {}",
                credentials.address.as_deref().unwrap_or("?")
            );
            self.session = Some(connector.connect(credentials).await?);
        }
        self.session_mut()
            .ok_or_else(|| ScenarioError::Switch("session lost".to_string()))
    }

    /// The open session, if any
    pub fn session_mut(&mut self) -> Option<&mut dyn LabSwitch> {
        match &mut self.session {
            Some(session) => Some(session.as_mut()),
            None => None,
        }
    }

    /// Close the session, if any. The slot is empty afterwards even if closing fails.
    pub async fn close(&mut self) -> Result<(), ScenarioError> {
        match self.session.take() {
            Some(mut session) => {
                debug!("Closing switch session");
                session.close().await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    pub(crate) struct FakeSwitch {
        pub(crate) log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LabSwitch for FakeSwitch {
        async fn set_interfaces_state(
            &mut self,
            interfaces: &[String],
            state: InterfaceState,
        ) -> Result<(), ScenarioError> {
            self.log.lock().push(format!("{} {state}", interfaces.join(",")));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ScenarioError> {
            self.log.lock().push("close".to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl SwitchConnector for FakeSwitch {
        async fn connect(&self, _credentials: &SwitchCredentials) -> Result<Box<dyn LabSwitch>, ScenarioError> {
            self.log.lock().push("connect".to_string());
            Ok(Box::new(self.clone()))
        }
    }
}
