use crate::models::NearbyUser;
use tracing::info;

/// Swipe-style cursor over the users returned by the nearby search.
#[derive(Debug, Default, Clone)]
pub struct Feed {
    users: Vec<NearbyUser>,
    index: usize,
}

impl Feed {
    pub fn replace(&mut self, users: Vec<NearbyUser>) {
        self.users = users;
        self.index = 0;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    pub fn current(&self) -> Option<&NearbyUser> {
        self.users.get(self.index)
    }

    pub fn remaining(&self) -> usize {
        self.users.len().saturating_sub(self.index)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current().is_none()
    }

    // TODO: send like/ignore to the backend once it exposes
    // /api/users/{id}/like and /api/users/{id}/ignore.
    pub fn like(&mut self) -> Option<NearbyUser> {
        let user = self.advance()?;
        info!("Liked user {} ({})", user.id, user.name.as_deref().unwrap_or("?"));
        Some(user)
    }

    pub fn ignore(&mut self) -> Option<NearbyUser> {
        let user = self.advance()?;
        info!("Ignored user {} ({})", user.id, user.name.as_deref().unwrap_or("?"));
        Some(user)
    }

    fn advance(&mut self) -> Option<NearbyUser> {
        let user = self.current()?.clone();
        self.index += 1;
        Some(user)
    }
}
