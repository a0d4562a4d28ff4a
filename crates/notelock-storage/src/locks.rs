use std::{
    collections::HashSet,
    sync::{Condvar, Mutex},
};

/// Serialises operations on the same file name. Different names never block each other.
#[derive(Debug, Default)]
pub(crate) struct FileLocks {
    busy: Mutex<HashSet<String>>,
    released: Condvar,
}

impl FileLocks {
    pub(crate) fn acquire(&self, name: &str) -> FileGuard<'_> {
        let mut busy = self.busy.lock().unwrap_or_else(|p| p.into_inner());
        while busy.contains(name) {
            busy = self
                .released
                .wait(busy)
                .unwrap_or_else(|p| p.into_inner());
        }
        busy.insert(name.to_string());
        FileGuard {
            locks: self,
            name: name.to_string(),
        }
    }
}

pub(crate) struct FileGuard<'a> {
    locks: &'a FileLocks,
    name: String,
}

impl Drop for FileGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self.locks.busy.lock().unwrap_or_else(|p| p.into_inner());
        busy.remove(&self.name);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use super::*;

    #[test]
    fn distinct_names_do_not_block() {
        let locks = FileLocks::default();
        let _a = locks.acquire("note_a.txt");
        let _b = locks.acquire("note_b.txt");
    }

    #[test]
    fn same_name_waits_for_release() {
        let locks = FileLocks::default();
        let first_done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let guard = locks.acquire("note_a.txt");
            scope.spawn(|| {
                let _guard = locks.acquire("note_a.txt");
                assert!(first_done.load(Ordering::SeqCst), "acquired while busy");
            });
            std::thread::sleep(Duration::from_millis(30));
            first_done.store(true, Ordering::SeqCst);
            drop(guard);
        });
    }
}
