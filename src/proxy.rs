//! Deferred-target proxy.
//!
//! A [`DeferredProxy`] stands in for an object whose implementation is only
//! known after negotiation. Every member of the facade is classified once, at
//! construction, by a [`MemberTable`]:
//!
//! - **deferred** members return a future immediately and forward to the
//!   target once it is resolved, in issue order, adopting its outcome;
//! - **chained** members forward for side effect only, in issue order, and
//!   let the facade be returned to the caller synchronously;
//! - **synchronous** members read straight through to the live target and
//!   fail before resolution.
//!
//! The target slot is written exactly once, through the [`Resolver`] returned
//! alongside the proxy.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::task::ArcWake;
use once_cell::unsync::OnceCell;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberPolicy {
    Deferred,
    Chained,
    Synchronous,
}

impl MemberPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberPolicy::Deferred => "deferred",
            MemberPolicy::Chained => "chained",
            MemberPolicy::Synchronous => "synchronous",
        }
    }
}

/// Member name -> policy. The three lists must be disjoint.
#[derive(Debug, Clone, Default)]
pub struct MemberTable {
    members: BTreeMap<&'static str, MemberPolicy>,
}

impl MemberTable {
    pub fn new(
        deferred: &[&'static str],
        chained: &[&'static str],
        synchronous: &[&'static str],
    ) -> Result<Self> {
        let mut members = BTreeMap::new();
        let lists = [
            (deferred, MemberPolicy::Deferred),
            (chained, MemberPolicy::Chained),
            (synchronous, MemberPolicy::Synchronous),
        ];
        for (names, policy) in lists {
            for name in names {
                if members.insert(*name, policy).is_some() {
                    return Err(Error::DuplicateMember(name.to_string()));
                }
            }
        }
        Ok(Self { members })
    }

    pub fn policy(&self, member: &str) -> Option<MemberPolicy> {
        self.members.get(member).copied()
    }

    pub fn check(&self, member: &str, expected: MemberPolicy) -> Result<()> {
        match self.policy(member) {
            None => Err(Error::UnknownMember(member.to_string())),
            Some(policy) if policy != expected => Err(Error::MemberPolicy {
                member: member.to_string(),
                expected: expected.as_str().to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    pub fn members(&self, policy: MemberPolicy) -> impl Iterator<Item = &'static str> + '_ {
        self.members
            .iter()
            .filter(move |(_, p)| **p == policy)
            .map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Work issued before resolution, replayed in issue order.
enum Queued<T: ?Sized + 'static> {
    Chained(Box<dyn FnOnce(&T)>),
    Deferred(Box<dyn FnOnce(Rc<T>) -> LocalBoxFuture<'static, ()>>),
}

/// Callers waiting on replayed calls. Any wake-up from a replayed call wakes
/// all of them; whichever is polled first drives every replayed call.
#[derive(Default)]
struct Waiters(Mutex<Vec<Waker>>);

impl Waiters {
    fn register(&self, waker: &Waker) {
        if let Ok(mut wakers) = self.0.lock() {
            if !wakers.iter().any(|known| known.will_wake(waker)) {
                wakers.push(waker.clone());
            }
        }
    }
}

impl ArcWake for Waiters {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let wakers = match arc_self.0.lock() {
            Ok(mut wakers) => std::mem::take(&mut *wakers),
            Err(_) => return,
        };
        for waker in wakers {
            waker.wake();
        }
    }
}

struct Slot<T: ?Sized + 'static> {
    target: OnceCell<Rc<T>>,
    backlog: RefCell<Vec<Queued<T>>>,
    /// Deferred calls started at resolution that have not finished yet.
    replayed: RefCell<FuturesUnordered<LocalBoxFuture<'static, ()>>>,
    waiters: Arc<Waiters>,
    disconnected: Cell<bool>,
}

impl<T: ?Sized + 'static> Slot<T> {
    /// Polls the replayed calls until none of them can make progress.
    fn drive(&self) {
        let waker = futures::task::waker(self.waiters.clone());
        let mut cx = Context::from_waker(&waker);
        // skipped when re-entered from inside a replayed call
        let Ok(mut replayed) = self.replayed.try_borrow_mut() else {
            return;
        };
        while let Poll::Ready(Some(())) = replayed.poll_next_unpin(&mut cx) {}
    }
}

/// Caller side of a deferred call issued before resolution.
struct Replay<T: ?Sized + 'static, R> {
    slot: Rc<Slot<T>>,
    outcome: oneshot::Receiver<Result<R>>,
}

impl<T: ?Sized + 'static, R> Future for Replay<T, R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.slot.waiters.register(cx.waker());
        this.slot.drive();
        match this.outcome.poll_unpin(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Disconnected)),
            Poll::Pending => Poll::Pending,
        }
    }
}

enum Issued<T: ?Sized + 'static, Fut, R> {
    Forwarded(Fut),
    Queued(Replay<T, R>),
    Rejected(Error),
}

pub struct DeferredProxy<T: ?Sized + 'static> {
    members: MemberTable,
    slot: Rc<Slot<T>>,
    ready: Shared<oneshot::Receiver<()>>,
}

/// Write side of a [`DeferredProxy`]. Dropping it unresolved fails every
/// pending deferred call with [`Error::Disconnected`].
pub struct Resolver<T: ?Sized + 'static> {
    slot: Rc<Slot<T>>,
    signal: RefCell<Option<oneshot::Sender<()>>>,
}

impl<T: ?Sized + 'static> DeferredProxy<T> {
    pub fn new(members: MemberTable) -> (Self, Resolver<T>) {
        let (tx, rx) = oneshot::channel();
        let slot = Rc::new(Slot {
            target: OnceCell::new(),
            backlog: RefCell::new(Vec::new()),
            replayed: RefCell::new(FuturesUnordered::new()),
            waiters: Arc::new(Waiters::default()),
            disconnected: Cell::new(false),
        });
        let proxy = Self {
            members,
            slot: slot.clone(),
            ready: rx.shared(),
        };
        let resolver = Resolver {
            slot,
            signal: RefCell::new(Some(tx)),
        };
        (proxy, resolver)
    }

    pub fn members(&self) -> &MemberTable {
        &self.members
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.target.get().is_some()
    }

    /// Resolves once the target is connected.
    pub fn ready(&self) -> impl Future<Output = Result<()>> + 'static {
        let ready = self.ready.clone();
        async move { ready.await.map_err(|_| Error::Disconnected) }
    }

    /// Issue a deferred call. The arguments are captured by `call` now.
    /// Before resolution the call joins the backlog and is started by
    /// [`Resolver::resolve`] in issue order, whether or not the returned
    /// future has been polled yet.
    pub fn defer<F, Fut, R>(&self, member: &'static str, call: F) -> impl Future<Output = Result<R>> + 'static
    where
        F: FnOnce(Rc<T>) -> Fut + 'static,
        Fut: Future<Output = Result<R>> + 'static,
        R: 'static,
    {
        let issued = self.issue(member, call);
        async move {
            match issued {
                Issued::Forwarded(call) => call.await,
                Issued::Queued(replay) => replay.await,
                Issued::Rejected(err) => Err(err),
            }
        }
    }

    fn issue<F, Fut, R>(&self, member: &'static str, call: F) -> Issued<T, Fut, R>
    where
        F: FnOnce(Rc<T>) -> Fut + 'static,
        Fut: Future<Output = Result<R>> + 'static,
        R: 'static,
    {
        if let Err(err) = self.members.check(member, MemberPolicy::Deferred) {
            return Issued::Rejected(err);
        }
        if let Some(target) = self.slot.target.get() {
            return Issued::Forwarded(call(target.clone()));
        }
        if self.slot.disconnected.get() {
            return Issued::Rejected(Error::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        let replay = move |target: Rc<T>| -> LocalBoxFuture<'static, ()> {
            async move {
                let _ = tx.send(call(target).await);
            }
            .boxed_local()
        };
        self.slot.backlog.borrow_mut().push(Queued::Deferred(Box::new(replay)));
        Issued::Queued(Replay {
            slot: self.slot.clone(),
            outcome: rx,
        })
    }

    /// Issue a chained call: forwarded now if connected, otherwise queued
    /// behind the calls already waiting.
    pub fn chain<F>(&self, member: &'static str, call: F) -> Result<()>
    where
        F: FnOnce(&T) + 'static,
    {
        self.members.check(member, MemberPolicy::Chained)?;
        match self.slot.target.get() {
            Some(target) => call(target.as_ref()),
            None if self.slot.disconnected.get() => return Err(Error::Disconnected),
            None => self.slot.backlog.borrow_mut().push(Queued::Chained(Box::new(call))),
        }
        Ok(())
    }

    /// Read a synchronous member from the live target.
    pub fn read<F, R>(&self, member: &'static str, read: F) -> Result<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.members.check(member, MemberPolicy::Synchronous)?;
        let target = self
            .slot
            .target
            .get()
            .ok_or_else(|| Error::NotConnected(member.to_string()))?;
        Ok(read(target.as_ref()))
    }
}

impl<T: ?Sized + 'static> Resolver<T> {
    /// Bind the target and replay the backlog in issue order. Each deferred
    /// call is polled once here, so it reaches the target before the next
    /// queued call does. Fails with [`Error::AlreadyResolved`] on a second
    /// call.
    pub fn resolve(&self, target: Rc<T>) -> Result<()> {
        if self.slot.target.set(target.clone()).is_err() {
            return Err(Error::AlreadyResolved);
        }
        let backlog = std::mem::take(&mut *self.slot.backlog.borrow_mut());
        for queued in backlog {
            match queued {
                Queued::Chained(call) => call(target.as_ref()),
                Queued::Deferred(call) => {
                    let started = call(target.clone());
                    self.slot.replayed.borrow().push(started);
                    self.slot.drive();
                }
            }
        }
        if let Some(signal) = self.signal.borrow_mut().take() {
            let _ = signal.send(());
        }
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.target.get().is_some()
    }
}

impl<T: ?Sized + 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if self.slot.target.get().is_some() {
            return;
        }
        self.slot.disconnected.set(true);
        // dropping the queued senders fails their callers
        let abandoned = std::mem::take(&mut *self.slot.backlog.borrow_mut());
        drop(abandoned);
    }
}
