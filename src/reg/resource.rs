use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

/// Reentrant exclusive-access lock. A register holds its resource while it
/// mutates its value, writes hardware or changes its lock mask. Several
/// registers may share one resource to coalesce their locks; the owning thread
/// can take it again, so composite registers may drive backing registers that
/// share it.
#[derive(Debug, Default)]
pub struct Resource {
    owner: Mutex<(Option<ThreadId>, usize)>,
    released: Condvar,
}

impl Resource {
    pub fn new() -> Arc<Self> {
        Arc::new(Resource::default())
    }

    pub fn lock(self: &Arc<Self>) -> ResourceGuard {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap();
        loop {
            match owner.0 {
                None => {
                    *owner = (Some(me), 1);
                    break;
                }
                Some(id) if id == me => {
                    owner.1 += 1;
                    break;
                }
                Some(_) => owner = self.released.wait(owner).unwrap(),
            }
        }
        ResourceGuard { res: self.clone() }
    }

    fn unlock(&self) {
        let mut owner = self.owner.lock().unwrap();
        owner.1 -= 1;
        if owner.1 == 0 {
            owner.0 = None;
            self.released.notify_one();
        }
    }
}

pub struct ResourceGuard {
    res: Arc<Resource>,
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.res.unlock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reentrant_lock_test() {
        let r = Resource::new();
        let _a = r.lock();
        let _b = r.lock();
    }

    #[test]
    fn exclusive_lock_test() {
        let r = Resource::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let threads = (0..4)
            .map(|_| {
                let r = r.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _g = r.lock();
                        let v = counter.load(Ordering::SeqCst);
                        thread::yield_now();
                        counter.store(v + 1, Ordering::SeqCst);
                    }
                })
            })
            .collect::<Vec<_>>();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 400);
    }
}
