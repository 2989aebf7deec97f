// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: Zero-sized types enforce the sync, build, stop, patch, start, verify order.

/// Initial state: lock held, nothing changed yet.
/// Available actions: `sync()`
#[derive(Debug, Clone, Copy)]
pub struct Initialized;

/// Source at the target ref (or sync skipped).
/// Available actions: `build()`
#[derive(Debug, Clone, Copy)]
pub struct Synced;

/// Images rebuilt (or build skipped).
/// Available actions: `stop()`
#[derive(Debug, Clone, Copy)]
pub struct Built;

/// Affected services stopped.
/// Available actions: `patch()`
#[derive(Debug, Clone, Copy)]
pub struct Stopped;

/// Data corrections applied.
/// Available actions: `start()`
#[derive(Debug, Clone, Copy)]
pub struct Patched;

/// Services started and running.
/// Available actions: `verify()`
#[derive(Debug, Clone, Copy)]
pub struct Started;

/// Health verdict reached.
/// Available actions: `verdict()`, `report()`
#[derive(Debug, Clone, Copy)]
pub struct Verified;
