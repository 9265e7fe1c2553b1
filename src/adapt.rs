//! Adapters from [`futures`] to the value contracts.
//!
//! The engine itself never polls anything. These spawn onto whatever [`LocalSpawn`] executor calling code provides.

use crate::{
	source::Deferral,
	value::{Failure, Observable, Observer, Teardown, Value},
};
use core::future::Future;
use futures::{
	future::{abortable, FutureExt},
	stream::{LocalBoxStream, Stream, StreamExt},
	task::{LocalSpawn, LocalSpawnExt, SpawnError},
};
use std::rc::Rc;
use tracing::{trace, warn};

/// Spawns `future` and returns a deferred value that settles with its output.
///
/// # Errors
///
/// Iff `spawner` refuses the task.
pub fn deferred_from_future<Sp, F>(spawner: &Sp, future: F) -> Result<Value, SpawnError>
where
	Sp: LocalSpawn + ?Sized,
	F: Future<Output = Result<Value, Failure>> + 'static,
{
	let deferral = Deferral::new();
	let settle = deferral.clone();
	spawner.spawn_local(async move {
		match future.await {
			Ok(value) => settle.resolve(value),
			Err(reason) => settle.reject(reason),
		}
	})?;
	Ok(deferral.into())
}

/// A cold stream: every subscription spawns a fresh instance, which is aborted on teardown.
struct Spawned<Sp> {
	spawner: Sp,
	make: Rc<dyn Fn() -> LocalBoxStream<'static, Result<Value, Failure>>>,
}

impl<Sp: LocalSpawn> Observable for Spawned<Sp> {
	fn subscribe(&self, observer: Observer) -> Teardown {
		let mut stream = (self.make)();
		let forward = observer.clone();
		let (task, handle) = abortable(async move {
			while let Some(item) = stream.next().await {
				match item {
					Ok(value) => forward.next(value),
					Err(reason) => return forward.error(reason),
				}
			}
			forward.complete();
		});

		match self.spawner.spawn_local(task.map(|_| ())) {
			Ok(()) => Teardown::new(move || {
				trace!("Aborting spawned stream.");
				handle.abort();
			}),
			Err(error) => {
				warn!("Couldn't spawn stream: {}", error);
				observer.error(Failure::new(error.to_string()));
				Teardown::noop()
			}
		}
	}
}

/// Wraps a [`Stream`] factory as a stream value.
///
/// `make` is called once per subscription. `Err` items fail the subscription.
pub fn stream_from_fn<Sp, F, St>(spawner: Sp, make: F) -> Value
where
	Sp: LocalSpawn + 'static,
	F: Fn() -> St + 'static,
	St: Stream<Item = Result<Value, Failure>> + 'static,
{
	Value::Stream(Rc::new(Spawned {
		spawner,
		make: Rc::new(move || make().boxed_local()),
	}))
}
