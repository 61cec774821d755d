// SPDX-License-Identifier: MIT

//! Graph state, nodes and routers

use crate::adk::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// State threaded through a graph.
///
/// Nodes never mutate the state directly; they return an `Update` which the
/// executor folds in with [`apply`](GraphState::apply). Each field of the
/// implementing type decides whether it is overwritten or appended to.
pub trait GraphState: Clone + Send + Sync + 'static {
    type Update: Send + 'static;

    fn apply(&mut self, update: Self::Update);
}

/// A unit of work in a graph
#[async_trait]
pub trait Node<S: GraphState>: Send + Sync {
    async fn run(&self, state: &S) -> Result<S::Update>;
}

/// Chooses the key of the next edge from the current state
#[async_trait]
pub trait Router<S: GraphState>: Send + Sync {
    async fn route(&self, state: &S) -> Result<String>;
}

/// Node backed by an async closure taking an owned copy of the state
pub struct FnNode<S, F> {
    f: F,
    _state: PhantomData<fn(S)>,
}

#[async_trait]
impl<S, F, Fut> Node<S> for FnNode<S, F>
where
    S: GraphState,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S::Update>> + Send,
{
    async fn run(&self, state: &S) -> Result<S::Update> {
        (self.f)(state.clone()).await
    }
}

/// Wrap an async closure as a node
pub fn node_fn<S, F, Fut>(f: F) -> Arc<dyn Node<S>>
where
    S: GraphState,
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S::Update>> + Send + 'static,
{
    Arc::new(FnNode {
        f,
        _state: PhantomData,
    })
}

/// Router backed by a synchronous predicate
pub struct FnRouter<S, F> {
    f: F,
    _state: PhantomData<fn(S)>,
}

#[async_trait]
impl<S, F> Router<S> for FnRouter<S, F>
where
    S: GraphState,
    F: Fn(&S) -> String + Send + Sync,
{
    async fn route(&self, state: &S) -> Result<String> {
        Ok((self.f)(state))
    }
}

/// Wrap a plain function of the state as a router
pub fn route_fn<S, F>(f: F) -> Arc<dyn Router<S>>
where
    S: GraphState,
    F: Fn(&S) -> String + Send + Sync + 'static,
{
    Arc::new(FnRouter {
        f,
        _state: PhantomData,
    })
}

/// Router backed by an async closure, for edges that consult a model
pub struct AsyncFnRouter<S, F> {
    f: F,
    _state: PhantomData<fn(S)>,
}

#[async_trait]
impl<S, F, Fut> Router<S> for AsyncFnRouter<S, F>
where
    S: GraphState,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send,
{
    async fn route(&self, state: &S) -> Result<String> {
        (self.f)(state.clone()).await
    }
}

pub fn async_route_fn<S, F, Fut>(f: F) -> Arc<dyn Router<S>>
where
    S: GraphState,
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    Arc::new(AsyncFnRouter {
        f,
        _state: PhantomData,
    })
}
