use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinSide {
    Left,
    Right,
}

impl JoinSide {
    pub fn other(self) -> Self {
        match self {
            JoinSide::Left => JoinSide::Right,
            JoinSide::Right => JoinSide::Left,
        }
    }
}

/// One side of a stream-stream join.
///
/// The two sides of a join share `join_id`; at runtime they share one pair of
/// buffers, each keeping the latest envelope per key for `ttl`.
pub struct PartialJoinSpec {
    join_id: u32,
    side: JoinSide,
    key_fn: UserFn<KeyFn>,
    join_fn: UserFn<JoinFn>,
    ttl: Duration,
}

impl PartialJoinSpec {
    pub fn new(
        join_id: u32,
        side: JoinSide,
        key_fn: UserFn<KeyFn>,
        join_fn: UserFn<JoinFn>,
        ttl: Duration,
    ) -> Self {
        Self {
            join_id,
            side,
            key_fn,
            join_fn,
            ttl,
        }
    }

    pub fn join_id(&self) -> u32 {
        self.join_id
    }

    pub fn side(&self) -> JoinSide {
        self.side
    }

    pub fn key_fn(&self) -> &UserFn<KeyFn> {
        &self.key_fn
    }

    pub fn join_fn(&self) -> &UserFn<JoinFn> {
        &self.join_fn
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn try_clone(&self) -> Option<Self> {
        Some(Self {
            join_id: self.join_id,
            side: self.side,
            key_fn: self.key_fn.try_clone()?,
            join_fn: self.join_fn.try_clone()?,
            ttl: self.ttl,
        })
    }
}

impl fmt::Debug for PartialJoinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialJoinSpec")
            .field("join_id", &self.join_id)
            .field("side", &self.side)
            .field("ttl", &self.ttl)
            .finish()
    }
}
