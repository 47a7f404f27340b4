//! Load lifecycle as an explicit state machine.
//!
//! ```text
//!            LoadRequested              LoadSucceeded
//!   Idle ───────────────────► Loading ───────────────► Loaded
//!    ▲  ▲                       │  ▲                     │
//!    │  │ Reset                 │  │ LoadRequested       │ Reset / ResourceVanished
//!    │  └───────────────────────┤  │                     │
//!    │                LoadFailed▼  │                     │
//!    │ Reset                   Failed                    │
//!    └─────────────────────────────┴─────────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub load_machine(Idle)

    Idle => {
        LoadRequested => Loading,
        Reset => Idle
    },
    Loading => {
        LoadSucceeded => Loaded,
        LoadFailed => Failed,
        // The running attempt keeps going but can no longer commit.
        Reset => Idle
    },
    Loaded => {
        Reset => Idle,
        ResourceVanished => Idle
    },
    Failed => {
        LoadRequested => Loading,
        Reset => Idle
    }
}

pub use load_machine::Input as LoadMachineInput;
pub use load_machine::State as LoadMachineState;
pub use load_machine::StateMachine as LoadMachine;

/// Externally visible load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Failed,
}

impl From<&LoadMachineState> for LoadStatus {
    fn from(state: &LoadMachineState) -> Self {
        match state {
            LoadMachineState::Idle => LoadStatus::Idle,
            LoadMachineState::Loading => LoadStatus::Loading,
            LoadMachineState::Loaded => LoadStatus::Loaded,
            LoadMachineState::Failed => LoadStatus::Failed,
        }
    }
}
