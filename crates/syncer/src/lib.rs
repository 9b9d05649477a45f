//! Fan-out/fan-in correlation of LLM tool calls dispatched over the mesh.
//!
//! # Purpose
//!
//! - Dispatch every tool call of one LLM round to the remote functions that own its tag.
//! - Gather their completions, which arrive asynchronously, out of order, possibly duplicated,
//!   and possibly before the round finished registering.
//! - Hand back exactly one result per tool call, substituting a timeout placeholder for any
//!   call that did not answer in time.
//! - Exclude the LLM provider loop, prompt handling and transport wiring; see `sluice-caller`
//!   and `sluice-bridge`.
//!
//! # Mental model
//!
//! - One coordination task owns all mutable state: the registered waits and the orphan buffer.
//!   Everything else talks to it through messages.
//! - Registration and cleanup share one ordered control queue, so a call's cleanup can never
//!   overtake its own registration.
//! - Completions arrive on a separate result stream. A completion whose call is registered is
//!   forwarded at once; otherwise it is buffered under its request id until the call registers.
//! - A call owns its timer. The coordination task never sleeps on behalf of a call.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`CallSyncer`] | Engine handle | MUST be closed (or dropped) to stop the coordination task | `CallSyncer::new`, `CallSyncer::close` |
//! | [`DispatchSink`] | Outbound invocation port | MUST NOT block on remote execution | `DispatchSink::send` |
//! | [`ResultStream`] | Inbound completion stream | MUST be drained only by the coordination task | `result_channel` |
//! | [`ReducerPort`] | Producer handle for the result stream | Writes never block | `ReducerPort::on_frame` |
//! | [`SyncerConfig`] | Engine tunables | Zero call timeout means immediate timeout | `SyncerConfig::default` |
//! | [`SyncerStats`] | Snapshot of waits, buffer and tombstones | Answered in control-queue order | `CallSyncer::stats` |
//!
//! # Invariants
//!
//! 1. A call MUST return exactly one result per dispatched tool call, real or placeholder.
//!    - Enforced in: `CallSyncer::call`
//!    - Tested by: `tests::timeout_yields_one_placeholder_per_call`, `tests::partial_answers_mix_results_and_placeholders`
//!    - Failure symptom: the LLM sees a tool call without a matching tool message and rejects the follow-up request.
//!
//! 2. A completion MUST be delivered at most once per tool call, even when the worker answers twice.
//!    - Enforced in: `Wait::deliver`, `CallSyncer::call`
//!    - Tested by: `tests::duplicate_answers_are_collapsed`
//!    - Failure symptom: duplicate tool messages in the follow-up request.
//!
//! 3. Completions that arrive before their call registers MUST be buffered and handed over on registration.
//!    - Enforced in: `Coordinator::on_inbound`, `Coordinator::register`
//!    - Tested by: `coordinator::tests::buffered_completions_drain_on_register`, `tests::completions_arriving_during_dispatch_are_not_lost`
//!    - Failure symptom: fast workers time out even though they answered.
//!
//! 4. A call MUST only ever see completions carrying its own request id.
//!    - Enforced in: `Coordinator::on_inbound`
//!    - Tested by: `tests::concurrent_rounds_stay_isolated`
//!    - Failure symptom: one conversation receives another conversation's tool output.
//!
//! 5. A call reusing a request id that another call still waits on MUST be refused before
//!    anything is dispatched.
//!    - Enforced in: `Coordinator::register` (acknowledged registration), `CallSyncer::call`
//!    - Tested by: `tests::reused_request_id_is_rejected_while_outstanding`
//!    - Failure symptom: the first call returns the refused call's tool output.
//!
//! 6. Once a call returns, its wait and buffered completions MUST be released and later
//!    completions for its request id MUST be dropped.
//!    - Enforced in: `CleanupGuard::drop`, `Coordinator::cleanup`
//!    - Tested by: `tests::finished_rounds_leave_no_state`, `tests::dropped_call_releases_its_wait`,
//!      `tests::sink_refusal_aborts_the_round`
//!    - Failure symptom: memory grows with every round; late answers pile up in the buffer.
//!
//! 7. The coordination task MUST never block on a call.
//!    - Enforced in: `Wait::deliver` (bounded `try_send` sized to the expected count)
//!    - Tested by: `tests::cancelled_call_does_not_stall_the_engine`
//!    - Failure symptom: one slow or abandoned call freezes every other round.
//!
//! # Failure modes
//!
//! - Sink refusal: the round is abandoned with [`Error::Dispatch`]; already-dispatched calls are
//!   retired so their answers are dropped.
//! - Malformed completions and completions without a request id are logged and dropped.
//! - Orphans whose call never registers expire after [`SyncerConfig::orphan_ttl`].
//! - A closed result stream is logged; registered calls then run to their timeout.

mod config;
mod coordinator;
mod error;
mod sink;
mod stream;
mod syncer;


pub use config::{DEFAULT_CALL_TIMEOUT, SyncerConfig};
pub use coordinator::SyncerStats;
pub use error::{DispatchError, Error, Result};
pub use sink::{ChannelSink, DispatchSink};
pub use stream::{Inbound, ReducerPort, ResultStream, result_channel};
pub use syncer::CallSyncer;
