use tokio::sync::RwLock;

/// The single mutable cell shared across turns: which model answers next.
///
/// Turns snapshot the cell once at start, so a switch that lands mid-turn
/// only affects turns that begin after it.
pub struct ActiveModel {
    cell: RwLock<Option<String>>,
}

impl ActiveModel {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            cell: RwLock::new(initial),
        }
    }

    pub async fn snapshot(&self) -> Option<String> {
        self.cell.read().await.clone()
    }

    pub async fn set(&self, name: String) {
        *self.cell.write().await = Some(name);
    }
}
