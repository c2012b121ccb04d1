//! Type-keyed registry of singleton services
//!
//! Services are registered as factories and built on first resolution, after which the same
//! `Arc` is handed out. A service is addressed by its type `T`, which can be a trait object such
//! as `dyn HttpClientFactory`, and optionally by a string key so several instances of the same
//! type can coexist.
//!
//! - Registering a plain service of a type that is already registered replaces it.
//! - Registering a keyed service under a key already in use for that type is an error.
//! - A factory that resolves the service it is building, directly or through other services,
//!   gets [`ServiceError::Cycle`].
use std::{
    any::{Any, TypeId, type_name},
    cell::RefCell,
    collections::HashMap,
    fmt,
    sync::Arc,
};

use parking_lot::{ReentrantMutex, RwLock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no service registered for type={type_name}, key={key:?}")]
    NotFound {
        type_name: &'static str,
        key: Option<String>,
    },

    #[error("a service of type={type_name} is already registered with key '{key}'")]
    DuplicateKey { type_name: &'static str, key: String },

    #[error("service type={type_name}, key={key:?} depends on itself")]
    Cycle {
        type_name: &'static str,
        key: Option<String>,
    },

    #[error("failed to construct service type={type_name}, key={key:?}: {source}")]
    Construction {
        type_name: &'static str,
        key: Option<String>,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ServiceKey {
    type_id: TypeId,
    key: Option<Arc<str>>,
}

/// Holds an `Arc<T>` for the registered `T`
type Instance = Box<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&ServiceRegistry) -> Result<Instance, BoxError> + Send + Sync>;

struct Registration {
    type_name: &'static str,
    factory: Factory,
    /// Reentrant so a factory resolving its own service fails on the borrow instead of
    /// deadlocking; other threads wait for the factory to finish
    instance: ReentrantMutex<RefCell<Option<Arc<Instance>>>>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("type_name", &self.type_name)
            .field(
                "resolved",
                &self
                    .instance
                    .lock()
                    .try_borrow()
                    .is_ok_and(|slot| slot.is_some()),
            )
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ServiceRegistry {
    registrations: RwLock<HashMap<ServiceKey, Arc<Registration>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn registration<T, F>(factory: F) -> Arc<Registration>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Arc::new(Registration {
            type_name: type_name::<T>(),
            factory: Box::new(move |services| {
                factory(services).map(|service| Box::new(service) as Instance)
            }),
            instance: ReentrantMutex::new(RefCell::new(None)),
        })
    }

    /// Register a singleton of type `T`, built by `factory` when first resolved
    pub fn add_singleton<T, F>(&self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let key = ServiceKey {
            type_id: TypeId::of::<T>(),
            key: None,
        };
        self.registrations
            .write()
            .insert(key, Self::registration(factory));
    }

    /// Register an already constructed singleton of type `T`
    pub fn add_instance<T>(&self, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.add_singleton::<T, _>(move |_| Ok(Arc::clone(&service)));
    }

    /// Register a singleton of type `T` addressable by `key`
    pub fn add_keyed_singleton<T, F>(
        &self,
        key: impl Into<Arc<str>>,
        factory: F,
    ) -> Result<(), ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let key = ServiceKey {
            type_id: TypeId::of::<T>(),
            key: Some(key.into()),
        };
        let mut registrations = self.registrations.write();
        if registrations.contains_key(&key) {
            return Err(ServiceError::DuplicateKey {
                type_name: type_name::<T>(),
                key: key.key.as_deref().unwrap_or_default().to_string(),
            });
        }
        registrations.insert(key, Self::registration(factory));
        Ok(())
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.contains_key::<T>(None)
    }

    pub fn contains_keyed<T: ?Sized + 'static>(&self, key: &str) -> bool {
        self.contains_key::<T>(Some(key))
    }

    fn contains_key<T: ?Sized + 'static>(&self, key: Option<&str>) -> bool {
        self.registrations.read().contains_key(&ServiceKey {
            type_id: TypeId::of::<T>(),
            key: key.map(Arc::from),
        })
    }

    /// Resolve the singleton of type `T`
    pub fn get<T>(&self) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<T>(None)
    }

    /// Resolve the singleton of type `T` registered under `key`
    pub fn get_keyed<T>(&self, key: &str) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<T>(Some(key))
    }

    fn resolve<T>(&self, key: Option<&str>) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let service_key = ServiceKey {
            type_id: TypeId::of::<T>(),
            key: key.map(Arc::from),
        };
        // the map lock is released before the factory runs, factories may resolve other services
        let registration = self
            .registrations
            .read()
            .get(&service_key)
            .map(Arc::clone)
            .ok_or_else(|| ServiceError::NotFound {
                type_name: type_name::<T>(),
                key: key.map(ToString::to_string),
            })?;

        let cycle = || ServiceError::Cycle {
            type_name: type_name::<T>(),
            key: key.map(ToString::to_string),
        };
        let guard = registration.instance.lock();
        let cached = guard.try_borrow().map_err(|_| cycle())?.as_ref().map(Arc::clone);
        let instance = match cached {
            Some(instance) => instance,
            None => {
                let mut slot = guard.try_borrow_mut().map_err(|_| cycle())?;
                let instance = Arc::new((registration.factory)(self).map_err(|source| {
                    ServiceError::Construction {
                        type_name: type_name::<T>(),
                        key: key.map(ToString::to_string),
                        source,
                    }
                })?);
                *slot = Some(Arc::clone(&instance));
                instance
            }
        };

        instance
            .downcast_ref::<Arc<T>>()
            .map(Arc::clone)
            .ok_or_else(|| ServiceError::NotFound {
                type_name: type_name::<T>(),
                key: key.map(ToString::to_string),
            })
    }
}
