/// A local edit layered over a value the store may update at any time.
///
/// Server updates only replace what the user sees while the buffer is clean;
/// a dirty buffer keeps the local edit and tracks the new server value
/// underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditBuffer<T> {
    Clean { server: T },
    Dirty { server: T, local: T },
}

impl<T: Clone + PartialEq> EditBuffer<T> {
    pub fn new(server: T) -> Self {
        Self::Clean { server }
    }

    /// What the user should see.
    pub fn current(&self) -> &T {
        match self {
            Self::Clean { server } => server,
            Self::Dirty { local, .. } => local,
        }
    }

    pub fn server(&self) -> &T {
        match self {
            Self::Clean { server } | Self::Dirty { server, .. } => server,
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, Self::Dirty { .. })
    }

    /// Replace the local value. Editing back to the server value cleans the buffer.
    pub fn edit(&mut self, value: T) {
        let server = self.server().clone();
        *self = if value == server {
            Self::Clean { server }
        } else {
            Self::Dirty { server, local: value }
        };
    }

    /// Change the local value in place.
    pub fn edit_with(&mut self, f: impl FnOnce(&mut T)) {
        let mut value = self.current().clone();
        f(&mut value);
        self.edit(value);
    }

    pub fn on_server_update(&mut self, value: T) {
        match self {
            Self::Clean { server } | Self::Dirty { server, .. } => *server = value,
        }
    }

    /// Accept the local edit as the new server value and return it.
    pub fn commit(&mut self) -> T {
        let value = self.current().clone();
        *self = Self::Clean {
            server: value.clone(),
        };
        value
    }

    /// Throw the local edit away.
    pub fn discard(&mut self) {
        let server = self.server().clone();
        *self = Self::Clean { server };
    }
}
