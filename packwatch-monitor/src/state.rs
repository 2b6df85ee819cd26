use parking_lot::Mutex;
use std::sync::Arc;

/// État partagé entre le lien live, les handlers HTTP et les tâches advisory
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Copie de l'état ; le verrou n'est jamais gardé à travers un `.await`
pub fn snapshot<T: Clone>(state: &Shared<T>) -> T {
    state.lock().clone()
}
