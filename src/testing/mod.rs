//! In-process test double for the foreign runtime
//!
//! [`MockRuntime`] implements [`VmRuntime`] over plain tables and counts
//! everything the bridge's contracts care about: attachments performed,
//! references outstanding per mode, lookups crossing the boundary, faults
//! raised. The crate's own unit and integration tests assert the
//! exactly-once and leak-freedom properties against these counters; hosts
//! can reuse it to test their stubs without a live runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::vm::{ClassHandle, MethodHandle, ObjectHandle, RawEnv, VmError, VmRuntime};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum RefKind {
    Local,
    Global,
}

#[derive(Clone, Copy)]
struct RefRecord {
    // Underlying object identity; all references to one object share it.
    target: usize,
    kind: RefKind,
    // Owning context word for local references, 0 for globals.
    env: usize,
}

struct ThreadRecord {
    env: usize,
    name: Option<String>,
}

type MethodKey = (usize, String, String, bool);

/// A scriptable stand-in for the managed runtime.
///
/// Define classes and methods up front, then hand a leaked `&'static` of it
/// to `init_vm` or a [`crate::VmContext`].
pub struct MockRuntime {
    // Word generator for every handle the mock hands out; 0 stays reserved.
    next_word: AtomicUsize,
    classes: Mutex<HashMap<String, usize>>,
    methods: Mutex<HashMap<MethodKey, usize>>,
    refs: DashMap<usize, RefRecord>,
    threads: DashMap<ThreadId, ThreadRecord>,
    pending: DashMap<usize, usize>,
    fault_messages: DashMap<usize, String>,
    attaches: AtomicUsize,
    class_lookups: AtomicUsize,
    method_lookups: AtomicUsize,
    last_loader: AtomicUsize,
    refuse_attach: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            next_word: AtomicUsize::new(1),
            classes: Mutex::new(HashMap::new()),
            methods: Mutex::new(HashMap::new()),
            refs: DashMap::new(),
            threads: DashMap::new(),
            pending: DashMap::new(),
            fault_messages: DashMap::new(),
            attaches: AtomicUsize::new(0),
            class_lookups: AtomicUsize::new(0),
            method_lookups: AtomicUsize::new(0),
            last_loader: AtomicUsize::new(0),
            refuse_attach: AtomicUsize::new(0),
        }
    }

    fn fresh_word(&self) -> usize {
        self.next_word.fetch_add(1, Ordering::SeqCst)
    }

    /// Define a class visible to lookups, returning its identity.
    pub fn define_class(&self, name: &str) -> usize {
        let id = self.fresh_word();
        self.classes.lock().insert(name.to_string(), id);
        id
    }

    /// Define a method on an already-defined class.
    pub fn define_method(&self, class: &str, name: &str, signature: &str, is_static: bool) {
        let class_id = *self
            .classes
            .lock()
            .get(class)
            .expect("define_method on undefined class");
        let word = self.fresh_word();
        self.methods.lock().insert(
            (class_id, name.to_string(), signature.to_string(), is_static),
            word,
        );
    }

    /// Make the next attach attempt fail, for fatal-path tests.
    pub fn refuse_next_attach(&self) {
        self.refuse_attach.fetch_add(1, Ordering::SeqCst);
    }

    /// Raise a fault on `env`, as a boundary call would.
    pub fn raise_fault(&self, env: RawEnv, message: &str) {
        let target = self.fresh_word();
        self.fault_messages.insert(target, message.to_string());
        let word = self.fresh_word();
        self.refs.insert(
            word,
            RefRecord {
                target,
                kind: RefKind::Local,
                env: env.as_word(),
            },
        );
        self.pending.insert(env.as_word(), word);
    }

    fn target_of(&self, obj: ObjectHandle) -> usize {
        self.refs
            .get(&obj.as_word())
            .expect("operation on a dead reference")
            .target
    }

    fn new_ref(&self, target: usize, kind: RefKind, env: usize) -> usize {
        let word = self.fresh_word();
        self.refs.insert(word, RefRecord { target, kind, env });
        word
    }

    // ---- instrumentation ----------------------------------------------

    /// Number of attach operations that actually created a context.
    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    /// Class lookups that crossed the boundary (cache misses and probes).
    pub fn class_lookups(&self) -> usize {
        self.class_lookups.load(Ordering::SeqCst)
    }

    /// Method lookups that crossed the boundary.
    pub fn method_lookups(&self) -> usize {
        self.method_lookups.load(Ordering::SeqCst)
    }

    /// Live call-scope references across all threads.
    pub fn live_local_refs(&self) -> usize {
        self.refs
            .iter()
            .filter(|r| r.kind == RefKind::Local)
            .count()
    }

    /// Live process-lifetime references.
    pub fn live_global_refs(&self) -> usize {
        self.refs
            .iter()
            .filter(|r| r.kind == RefKind::Global)
            .count()
    }

    /// Live process-lifetime references to the named class.
    pub fn global_refs_to(&self, class: &str) -> usize {
        let Some(id) = self.classes.lock().get(class).copied() else {
            return 0;
        };
        self.refs
            .iter()
            .filter(|r| r.kind == RefKind::Global && r.target == id)
            .count()
    }

    /// The calling thread's visible name within the runtime, if attached
    /// and named.
    pub fn current_thread_name(&self) -> Option<String> {
        self.threads
            .get(&std::thread::current().id())
            .and_then(|r| r.name.clone())
    }

    /// Whether the calling thread currently holds a context.
    pub fn current_thread_attached(&self) -> bool {
        self.threads.contains_key(&std::thread::current().id())
    }

    /// The loader word used by the most recent class lookup (0 = default
    /// resolution root).
    pub fn last_loader_used(&self) -> usize {
        self.last_loader.load(Ordering::SeqCst)
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl VmRuntime for MockRuntime {
    fn attach_current_thread(&self, name: Option<&str>) -> Result<RawEnv, VmError> {
        let tid = std::thread::current().id();
        if let Some(record) = self.threads.get(&tid) {
            return Ok(RawEnv::from_word(record.env));
        }
        if self.refuse_attach.load(Ordering::SeqCst) > 0 {
            self.refuse_attach.fetch_sub(1, Ordering::SeqCst);
            return Err(VmError::AttachFailed("runtime refused thread".into()));
        }
        let env = self.fresh_word();
        self.threads.insert(
            tid,
            ThreadRecord {
                env,
                name: name.map(str::to_string),
            },
        );
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(RawEnv::from_word(env))
    }

    fn detach_current_thread(&self) {
        let tid = std::thread::current().id();
        if let Some((_, record)) = self.threads.remove(&tid) {
            // The runtime reclaims the thread's call-scope references.
            self.refs
                .retain(|_, r| !(r.kind == RefKind::Local && r.env == record.env));
            self.pending.remove(&record.env);
        }
    }

    fn find_class(
        &self,
        env: RawEnv,
        name: &str,
        loader: Option<ObjectHandle>,
    ) -> Result<ClassHandle, VmError> {
        self.class_lookups.fetch_add(1, Ordering::SeqCst);
        self.last_loader
            .store(loader.map_or(0, ObjectHandle::as_word), Ordering::SeqCst);
        let target = self.classes.lock().get(name).copied();
        match target {
            Some(id) => {
                let word = self.new_ref(id, RefKind::Local, env.as_word());
                Ok(ClassHandle::from_word(word))
            }
            None => {
                self.raise_fault(env, &format!("ClassNotFound: {name}"));
                Err(VmError::ClassNotFound(name.to_string()))
            }
        }
    }

    fn instance_method(
        &self,
        env: RawEnv,
        class: ClassHandle,
        name: &str,
        signature: &str,
    ) -> Result<MethodHandle, VmError> {
        self.lookup_method(env, class, name, signature, false)
    }

    fn static_method(
        &self,
        env: RawEnv,
        class: ClassHandle,
        name: &str,
        signature: &str,
    ) -> Result<MethodHandle, VmError> {
        self.lookup_method(env, class, name, signature, true)
    }

    fn new_local_ref(&self, env: RawEnv, obj: ObjectHandle) -> ObjectHandle {
        let target = self.target_of(obj);
        ObjectHandle::from_word(self.new_ref(target, RefKind::Local, env.as_word()))
    }

    fn delete_local_ref(&self, _env: RawEnv, obj: ObjectHandle) {
        let (_, record) = self
            .refs
            .remove(&obj.as_word())
            .expect("double release of a local reference");
        assert_eq!(record.kind, RefKind::Local, "global ref released as local");
    }

    fn new_global_ref(&self, _env: RawEnv, obj: ObjectHandle) -> ObjectHandle {
        let target = self.target_of(obj);
        ObjectHandle::from_word(self.new_ref(target, RefKind::Global, 0))
    }

    fn delete_global_ref(&self, obj: ObjectHandle) {
        let (_, record) = self
            .refs
            .remove(&obj.as_word())
            .expect("double release of a global reference");
        assert_eq!(record.kind, RefKind::Global, "local ref released as global");
    }

    fn fault_pending(&self, env: RawEnv) -> bool {
        self.pending.contains_key(&env.as_word())
    }

    fn take_fault(&self, env: RawEnv) -> Option<ObjectHandle> {
        self.pending
            .remove(&env.as_word())
            .map(|(_, word)| ObjectHandle::from_word(word))
    }

    fn describe_fault(&self, _env: RawEnv, fault: ObjectHandle) -> String {
        let target = self.target_of(fault);
        self.fault_messages
            .get(&target)
            .map(|m| m.value().clone())
            .unwrap_or_else(|| "<unknown fault>".to_string())
    }
}

impl MockRuntime {
    fn lookup_method(
        &self,
        env: RawEnv,
        class: ClassHandle,
        name: &str,
        signature: &str,
        is_static: bool,
    ) -> Result<MethodHandle, VmError> {
        self.method_lookups.fetch_add(1, Ordering::SeqCst);
        let class_id = self.target_of(class.as_object());
        let class_name = self
            .classes
            .lock()
            .iter()
            .find(|(_, &id)| id == class_id)
            .map(|(n, _)| n.clone())
            .unwrap_or_default();
        let key = (class_id, name.to_string(), signature.to_string(), is_static);
        match self.methods.lock().get(&key) {
            Some(&word) => Ok(MethodHandle::from_word(word)),
            None => {
                self.raise_fault(env, &format!("MethodNotFound: {class_name}.{name}"));
                Err(VmError::MethodNotFound {
                    class: class_name,
                    name: name.to_string(),
                    signature: signature.to_string(),
                })
            }
        }
    }
}
