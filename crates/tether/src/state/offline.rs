use tether_session::SessionDirectory;
use tether_transport::Transport;

use super::{Flow, StateHooks, StateKind};
use crate::context::Context;

/// Nothing running. The manager starts here (without `enter`) and returns
/// here whenever a session ends.
#[derive(Debug, Default)]
pub(crate) struct Offline;

impl StateHooks for Offline {
    const KIND: StateKind = StateKind::Offline;

    /// Tears the last session down: forgets every admitted player and shuts
    /// the transport down in the background.
    fn enter<T: Transport, D: SessionDirectory>(&mut self, cx: &mut Context<T, D>) -> Flow {
        cx.registry.clear();
        cx.begin_teardown();
        Flow::Stay
    }
}
