mod state;

pub use state::{SceneStateMachine, Transition};
