use shared::Turn;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::conversation::ConversationState;
use crate::generation::ResponseGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Generating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Blank input; nothing was recorded.
    Ignored,
    Answered(Turn),
}

/// Drives one session: records the user's line, asks the generator for a
/// reply, records that, and publishes the full transcript after each change.
pub struct InteractionController {
    state: ConversationState,
    generator: ResponseGenerator,
    phase: Phase,
    changes: watch::Sender<Vec<Turn>>,
}

impl InteractionController {
    pub fn new(generator: ResponseGenerator) -> Self {
        let (changes, _) = watch::channel(Vec::new());

        Self {
            state: ConversationState::new(),
            generator,
            phase: Phase::Idle,
            changes,
        }
    }

    /// Receives the whole ordered transcript every time a turn is appended.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Turn>> {
        self.changes.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turns(&self) -> &[Turn] {
        self.state.all()
    }

    pub async fn submit(&mut self, input: &str) -> Submission {
        if input.trim().is_empty() {
            debug!("ignoring blank submission");
            return Submission::Ignored;
        }

        self.append(Turn::user(input));

        self.phase = Phase::Generating;
        let reply = self.generator.generate(input).await;
        self.phase = Phase::Idle;

        let turn = Turn::assistant(reply);
        self.append(turn.clone());
        info!(turns = self.state.len(), "answered submission");

        Submission::Answered(turn)
    }

    fn append(&mut self, turn: Turn) {
        self.state.append(turn);
        self.changes.send_replace(self.state.all().to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use shared::Role;
    use test_log::test;

    use crate::generation::{GenerationConfig, MODEL_NOT_READY};
    use crate::model::{ModelError, SharedModel};
    use crate::testing::{self, ScriptedModel, FINE_THANKS};

    fn controller_with(model: SharedModel) -> InteractionController {
        InteractionController::new(ResponseGenerator::new(
            Arc::new(model),
            GenerationConfig::greedy(),
        ))
    }

    #[test(tokio::test)]
    async fn records_user_and_bot_turns() {
        let mut controller = controller_with(SharedModel::ready(testing::fixture_model(
            ScriptedModel::new(FINE_THANKS),
        )));

        let outcome = controller.submit("Hello, how are you?").await;

        assert_eq!(outcome, Submission::Answered(Turn::assistant("i am fine thanks")));
        assert_eq!(
            controller.turns(),
            &[
                Turn::user("Hello, how are you?"),
                Turn::assistant("i am fine thanks")
            ]
        );
        assert_eq!(controller.phase(), Phase::Idle);
    }

    #[test(tokio::test)]
    async fn blank_input_changes_nothing() {
        let backend = ScriptedModel::new(FINE_THANKS);
        let calls = backend.calls();
        let mut controller = controller_with(SharedModel::ready(testing::fixture_model(backend)));
        let mut changes = controller.subscribe();

        for blank in ["", "   ", "\t\n"] {
            assert_eq!(controller.submit(blank).await, Submission::Ignored);
        }

        assert!(controller.turns().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!changes.has_changed().unwrap());
    }

    #[test(tokio::test)]
    async fn subscribers_see_the_full_transcript() {
        let mut controller = controller_with(SharedModel::ready(testing::fixture_model(
            ScriptedModel::new(FINE_THANKS),
        )));
        let mut changes = controller.subscribe();

        controller.submit("hi").await;
        controller.submit("how are you").await;

        assert!(changes.has_changed().unwrap());
        let snapshot = changes.borrow_and_update().clone();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot, controller.turns());
        let roles: Vec<Role> = snapshot.iter().map(Turn::role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::User, Role::Assistant]);
    }

    #[test(tokio::test)]
    async fn failed_model_still_records_a_bot_turn() {
        let mut controller = controller_with(SharedModel::new(|| {
            Err(ModelError::Tokenizer("missing".to_owned()))
        }));

        controller.submit("hi").await;
        controller.submit("anyone there?").await;

        let turns = controller.turns();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[1].content(), MODEL_NOT_READY);
        assert_eq!(turns[3].content(), MODEL_NOT_READY);
    }

    #[test(tokio::test)]
    async fn long_input_never_records_an_empty_reply() {
        let long_input = "hello there ".repeat(30);

        let mut scripted = controller_with(SharedModel::ready(testing::fixture_model(
            ScriptedModel::new(FINE_THANKS),
        )));
        let Submission::Answered(reply) = scripted.submit(&long_input).await else {
            panic!("long input was ignored");
        };
        assert_eq!(reply.content(), "i");

        let unreachable = crate::inference::Config::new("http://127.0.0.1:9")
            .client()
            .unwrap();
        let mut remote =
            controller_with(SharedModel::ready(testing::fixture_model(unreachable)));
        let Submission::Answered(reply) = remote.submit(&long_input).await else {
            panic!("long input was ignored");
        };
        assert!(reply.content().starts_with("Sorry, I couldn't generate a response: "));
    }
}
