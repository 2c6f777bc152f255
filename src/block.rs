//! Groups lines between `>>>` and `<<<` into one block per tick

use crate::protocol::Event;
use tracing::trace;

pub const BEGIN_MARKER: &str = ">>>";
pub const END_MARKER: &str = "<<<";

/// Events reported by the server during one sampling pass. May be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub events: Vec<Event>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }
}

impl FromIterator<Event> for Block {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    InBlock(Block),
}

#[derive(Debug, Default)]
pub struct BlockAssembler {
    state: State,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_block(&self) -> bool {
        matches!(self.state, State::InBlock(_))
    }

    /// Feeds one framed line; returns the block it completes, if any.
    ///
    /// A begin marker always starts a fresh block, dropping whatever an
    /// unterminated block had collected.
    pub fn push_line(&mut self, line: &str) -> Option<Block> {
        if line == BEGIN_MARKER {
            if let State::InBlock(partial) = &self.state {
                trace!("Restarting block, dropping {} events", partial.len());
            }
            self.state = State::InBlock(Block::new());
            return None;
        }

        if line == END_MARKER && self.is_in_block() {
            return match std::mem::take(&mut self.state) {
                State::InBlock(block) => Some(block),
                State::Idle => None,
            };
        }

        match &mut self.state {
            State::Idle => {
                trace!("Discarding line outside block: {:?}", line);
                None
            }
            State::InBlock(block) => {
                match Event::decode(line) {
                    Some(event) => block.push(event),
                    None => trace!("Discarding unrecognized line: {:?}", line),
                }
                None
            }
        }
    }
}
