//! Transfer-engine pool.
//!
//! Each hardware context owns a small fixed set of engines, split
//! disjointly into read and write engines when the pool is built. Allocation
//! is a linear scan for the lowest free index. Pools are tiny and allocation
//! happens once per frame, never per tile.
//!
//! # Layout
//!
//! ```text
//! context 0: read [E0] write [E0]
//! context 1: read [E0] write [E0]
//! ...
//! ```

use std::fmt;
use std::num::NonZeroUsize;

use smallvec::SmallVec;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::format::Direction;
use crate::frame::FrameId;

/// Engines stored inline per direction before spilling to the heap.
const INLINE_ENGINES: usize = 4;

/// Opaque handle of the transfer session an engine has been opened with.
///
/// Issued by the descriptor layer; never dereferenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle(NonZeroUsize);

impl TransferHandle {
    /// Wrap a raw handle. Returns `None` for a null handle.
    pub fn new(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// The raw handle value.
    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Location of an engine: hardware context, direction class, index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId {
    /// Hardware context that owns the engine.
    pub context: usize,
    /// Direction class the engine belongs to.
    pub direction: Direction,
    /// Index within the context's engines of that direction.
    pub index: usize,
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}/{}{}", self.context, self.direction, self.index)
    }
}

/// A single transfer channel.
#[derive(Debug, Clone)]
pub struct Engine {
    in_use: bool,
    direction: Direction,
    frame: Option<FrameId>,
    handle: Option<TransferHandle>,
}

impl Engine {
    fn idle(direction: Direction) -> Self {
        Self {
            in_use: false,
            direction,
            frame: None,
            handle: None,
        }
    }

    /// Return to the idle state, dropping every back-reference.
    fn reset(&mut self) {
        *self = Self::idle(self.direction);
    }

    /// Whether the engine is bound to a frame.
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Direction class of this engine.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Frame this engine serves, if any.
    pub fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    /// Transfer session handle, once the descriptor layer has opened one.
    pub fn handle(&self) -> Option<TransferHandle> {
        self.handle
    }
}

/// A hardware execution context and its engines.
#[derive(Debug, Clone)]
pub struct HwContext {
    in_use: bool,
    read: SmallVec<[Engine; INLINE_ENGINES]>,
    write: SmallVec<[Engine; INLINE_ENGINES]>,
}

impl HwContext {
    fn new(read: usize, write: usize) -> Result<Self> {
        Ok(Self {
            in_use: false,
            read: idle_engines(Direction::Read, read)?,
            write: idle_engines(Direction::Write, write)?,
        })
    }

    /// Whether a frame currently occupies this context.
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Engines of one direction.
    pub fn engines(&self, direction: Direction) -> &[Engine] {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }

    fn engines_mut(&mut self, direction: Direction) -> &mut [Engine] {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }

    fn any_engine_busy(&self) -> bool {
        self.read.iter().chain(self.write.iter()).any(Engine::in_use)
    }
}

fn idle_engines(
    direction: Direction,
    count: usize,
) -> Result<SmallVec<[Engine; INLINE_ENGINES]>> {
    let mut engines = SmallVec::new();
    engines.try_reserve_exact(count).map_err(|e| {
        Error::AllocationFailed(format!("{count} {direction} engines: {e:?}"))
    })?;
    engines.extend((0..count).map(|_| Engine::idle(direction)));
    Ok(engines)
}

/// Engines of every hardware context in a session.
#[derive(Debug, Clone)]
pub struct EnginePool {
    contexts: Vec<HwContext>,
}

impl EnginePool {
    /// Build `hw_contexts` contexts with `read` + `write` engines each.
    pub fn new(hw_contexts: usize, read: usize, write: usize) -> Result<Self> {
        let mut contexts = Vec::new();
        contexts.try_reserve_exact(hw_contexts).map_err(|e| {
            Error::AllocationFailed(format!("{hw_contexts} hardware contexts: {e}"))
        })?;
        for _ in 0..hw_contexts {
            contexts.push(HwContext::new(read, write)?);
        }
        Ok(Self { contexts })
    }

    /// Build the pool described by `config`.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Self::new(
            config.hw_contexts,
            config.read_engines(),
            config.write_engines(),
        )
    }

    /// Number of hardware contexts.
    pub fn contexts(&self) -> usize {
        self.contexts.len()
    }

    /// A hardware context by index.
    pub fn context(&self, context: usize) -> Option<&HwContext> {
        self.contexts.get(context)
    }

    /// Lowest-index hardware context not serving a frame.
    pub fn first_free_context(&self) -> Option<usize> {
        self.contexts.iter().position(|c| !c.in_use)
    }

    /// Claim the lowest-index free engine of `direction` in `context`.
    ///
    /// Marks both the engine and its context in use.
    pub fn acquire(&mut self, context: usize, direction: Direction) -> Result<EngineId> {
        let ctx = self
            .contexts
            .get_mut(context)
            .ok_or(Error::NoFreeHardwareContext)?;

        let index = ctx
            .engines(direction)
            .iter()
            .position(|e| !e.in_use)
            .ok_or(Error::NoFreeEngine { context, direction })?;

        ctx.engines_mut(direction)[index].in_use = true;
        ctx.in_use = true;

        Ok(EngineId {
            context,
            direction,
            index,
        })
    }

    /// Record which frame an acquired engine serves.
    pub fn bind(&mut self, id: EngineId, frame: FrameId) {
        if let Some(engine) = self.engine_mut(id) {
            engine.frame = Some(frame);
        }
    }

    /// Release an engine. The context is freed once none of its engines is busy.
    pub fn release(&mut self, id: EngineId) {
        let Some(ctx) = self.contexts.get_mut(id.context) else {
            return;
        };
        if let Some(engine) = ctx.engines_mut(id.direction).get_mut(id.index) {
            engine.reset();
        }
        if !ctx.any_engine_busy() {
            ctx.in_use = false;
        }
    }

    /// An engine by id.
    pub fn engine(&self, id: EngineId) -> Option<&Engine> {
        self.contexts
            .get(id.context)?
            .engines(id.direction)
            .get(id.index)
    }

    fn engine_mut(&mut self, id: EngineId) -> Option<&mut Engine> {
        self.contexts
            .get_mut(id.context)?
            .engines_mut(id.direction)
            .get_mut(id.index)
    }

    /// Attach the descriptor layer's session handle to an engine.
    pub fn set_handle(&mut self, id: EngineId, handle: TransferHandle) {
        if let Some(engine) = self.engine_mut(id) {
            engine.handle = Some(handle);
        }
    }

    /// Number of busy engines of `direction` across all contexts.
    pub fn in_use(&self, direction: Direction) -> usize {
        self.contexts
            .iter()
            .map(|c| c.engines(direction).iter().filter(|e| e.in_use).count())
            .sum()
    }

    /// Total engines of `direction` across all contexts.
    pub fn capacity(&self, direction: Direction) -> usize {
        self.contexts.iter().map(|c| c.engines(direction).len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_shape() {
        let pool = EnginePool::from_config(&SessionConfig::default()).unwrap();
        assert_eq!(pool.contexts(), 4);
        assert_eq!(pool.capacity(Direction::Read), 4);
        assert_eq!(pool.capacity(Direction::Write), 4);
        assert_eq!(pool.first_free_context(), Some(0));
    }

    #[test]
    fn test_acquire_lowest_index() {
        let mut pool = EnginePool::new(1, 2, 2).unwrap();
        let a = pool.acquire(0, Direction::Read).unwrap();
        let b = pool.acquire(0, Direction::Read).unwrap();
        assert_eq!((a.index, b.index), (0, 1));

        let w = pool.acquire(0, Direction::Write).unwrap();
        assert_eq!(w.index, 0);
        assert_eq!(pool.in_use(Direction::Read), 2);
        assert_eq!(pool.in_use(Direction::Write), 1);

        pool.release(a);
        let c = pool.acquire(0, Direction::Read).unwrap();
        assert_eq!(c.index, 0);
    }

    #[test]
    fn test_no_free_engine() {
        let mut pool = EnginePool::new(1, 1, 1).unwrap();
        pool.acquire(0, Direction::Read).unwrap();
        assert_eq!(
            pool.acquire(0, Direction::Read),
            Err(Error::NoFreeEngine {
                context: 0,
                direction: Direction::Read
            })
        );
        // Write engines are a separate class.
        assert!(pool.acquire(0, Direction::Write).is_ok());
    }

    #[test]
    fn test_context_released_with_last_engine() {
        let mut pool = EnginePool::new(2, 1, 1).unwrap();
        let r = pool.acquire(0, Direction::Read).unwrap();
        let w = pool.acquire(0, Direction::Write).unwrap();
        assert_eq!(pool.first_free_context(), Some(1));

        pool.release(r);
        assert!(pool.context(0).unwrap().in_use());
        pool.release(w);
        assert!(!pool.context(0).unwrap().in_use());
        assert_eq!(pool.first_free_context(), Some(0));
    }

    #[test]
    fn test_release_clears_back_references() {
        let mut pool = EnginePool::new(1, 1, 1).unwrap();
        let id = pool.acquire(0, Direction::Write).unwrap();
        pool.bind(id, FrameId::new(3));
        pool.set_handle(id, TransferHandle::new(0xbeef).unwrap());

        let engine = pool.engine(id).unwrap();
        assert_eq!(engine.frame(), Some(FrameId::new(3)));
        assert_eq!(engine.handle().map(TransferHandle::get), Some(0xbeef));

        pool.release(id);
        let engine = pool.engine(id).unwrap();
        assert!(!engine.in_use());
        assert_eq!(engine.frame(), None);
        assert_eq!(engine.handle(), None);
        assert_eq!(engine.direction(), Direction::Write);
    }

    #[test]
    fn test_null_handle_rejected() {
        assert!(TransferHandle::new(0).is_none());
    }
}
