//! Graph node trait and context types.

use dasp_graph::{Buffer, Input};

/// Information available during block processing.
///
/// Passed to every [`AudioNode::process`] call.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz
    pub sample_rate: u32,
    /// Samples per block, always [`Buffer::LEN`]
    pub buffer_size: usize,
}

/// Identifies a node within one [`MixGraph`](crate::MixGraph).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// A processor hosted by a [`MixGraph`](crate::MixGraph).
///
/// Nodes are sources (no inputs), processors, or sinks (no outputs). They
/// never share mutable state with the control side; parameter changes arrive
/// as messages, drained at the start of each block:
///
/// ```
/// use raumklang::{AudioNode, ProcessContext};
/// use dasp_graph::{Buffer, Input};
///
/// enum LevelMessage {
///     Set(f32),
/// }
///
/// /// Emits a constant level.
/// struct Level(f32);
///
/// impl AudioNode for Level {
///     type Message = LevelMessage;
///
///     fn process(
///         &mut self,
///         _ctx: &ProcessContext,
///         messages: impl Iterator<Item = LevelMessage>,
///         _inputs: &[Input],
///         outputs: &mut [Buffer],
///     ) {
///         for LevelMessage::Set(level) in messages {
///             self.0 = level;
///         }
///         outputs[0].iter_mut().for_each(|s| *s = self.0);
///     }
/// }
/// ```
pub trait AudioNode: Send + 'static {
    /// Parameter update type; `()` for nodes without parameters.
    type Message: Send + 'static;

    /// Process one block.
    ///
    /// Drain `messages` first, then read `inputs` and write `outputs`. Each
    /// [`Input`] is one upstream node; the most recently connected comes
    /// first.
    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    );

    /// Number of upstream connections the node expects. Informational; the
    /// graph does not enforce it.
    fn num_inputs(&self) -> usize {
        0
    }

    /// Number of output channels.
    fn num_outputs(&self) -> usize {
        1
    }
}
