//! Application-supplied consumers of device frames
//!
//! Drawers are owned by the application. The registry only keeps weak
//! references, in registration order, and silently skips drawers that have
//! since been dropped.

use crate::catalog::FormatCatalog;
use crate::descriptor::DeviceDescriptor;
use crate::errors::{Result, UvcError};
use crate::types::{Resolution, TextureHandle};
use std::sync::{Arc, Weak};

/// A consumer that may claim devices and receive their preview textures.
///
/// Implementations are shared with the manager behind `Arc`, so callbacks take
/// `&self`; use interior mutability for any state they record.
pub trait Drawer: Send + Sync {
    /// Whether this drawer wants frames from `device`
    fn can_handle(&self, device: &DeviceDescriptor) -> bool;

    /// Preferred size for a claimed device, or `None` to defer
    fn select_resolution(
        &self,
        _device: &DeviceDescriptor,
        _catalog: &FormatCatalog,
    ) -> Option<Resolution> {
        None
    }

    /// Vote on a newly attached device; any `true` keeps it
    fn on_attach_decision(&self, device: &DeviceDescriptor) -> bool {
        self.can_handle(device)
    }

    fn on_preview_started(&self, _device: &DeviceDescriptor, _texture: TextureHandle) {}

    fn on_preview_stopped(&self, _device: &DeviceDescriptor) {}

    fn on_detached(&self, _device: &DeviceDescriptor) {}
}

#[derive(Default)]
pub struct DrawerRegistry {
    drawers: Vec<Weak<dyn Drawer>>,
}

impl DrawerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a drawer at the end of the dispatch order.
    ///
    /// Registering the same drawer twice is a contract violation.
    pub fn register(&mut self, drawer: &Arc<dyn Drawer>) -> Result<()> {
        self.prune();
        let already = self
            .drawers
            .iter()
            .filter_map(Weak::upgrade)
            .any(|d| Arc::ptr_eq(&d, drawer));
        if already {
            return Err(UvcError::invalid_argument("drawer registered twice"));
        }
        self.drawers.push(Arc::downgrade(drawer));
        log::debug!("Registered drawer #{}", self.drawers.len());
        Ok(())
    }

    /// Remove a drawer; returns whether it was registered
    pub fn unregister(&mut self, drawer: &Arc<dyn Drawer>) -> bool {
        let before = self.drawers.len();
        self.drawers.retain(|weak| match weak.upgrade() {
            Some(d) => !Arc::ptr_eq(&d, drawer),
            None => false,
        });
        before != self.drawers.len()
    }

    /// Drawers still alive, in registration order
    pub fn live(&self) -> Vec<Arc<dyn Drawer>> {
        self.drawers.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach vote. With no live drawers every device is accepted.
    pub fn accepts(&self, device: &DeviceDescriptor) -> bool {
        let live = self.live();
        live.is_empty() || live.iter().any(|d| d.on_attach_decision(device))
    }

    /// First non-`None` size from a drawer that claims the device
    pub fn select_resolution(
        &self,
        device: &DeviceDescriptor,
        catalog: &FormatCatalog,
    ) -> Option<Resolution> {
        self.live()
            .into_iter()
            .filter(|d| d.can_handle(device))
            .find_map(|d| d.select_resolution(device, catalog))
    }

    pub fn notify_preview_started(&self, device: &DeviceDescriptor, texture: TextureHandle) {
        for drawer in self.live().iter().filter(|d| d.can_handle(device)) {
            drawer.on_preview_started(device, texture);
        }
    }

    pub fn notify_preview_stopped(&self, device: &DeviceDescriptor) {
        for drawer in self.live().iter().filter(|d| d.can_handle(device)) {
            drawer.on_preview_stopped(device);
        }
    }

    pub fn notify_detached(&self, device: &DeviceDescriptor) {
        for drawer in self.live() {
            drawer.on_detached(device);
        }
    }

    fn prune(&mut self) {
        self.drawers.retain(|weak| weak.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Fixed {
        claims: bool,
        size: Option<Resolution>,
        started: Mutex<Vec<TextureHandle>>,
    }

    impl Fixed {
        fn new(claims: bool, size: Option<Resolution>) -> Arc<Self> {
            Arc::new(Self {
                claims,
                size,
                started: Mutex::new(Vec::new()),
            })
        }
    }

    impl Drawer for Fixed {
        fn can_handle(&self, _device: &DeviceDescriptor) -> bool {
            self.claims
        }

        fn select_resolution(&self, _: &DeviceDescriptor, _: &FormatCatalog) -> Option<Resolution> {
            self.size
        }

        fn on_preview_started(&self, _: &DeviceDescriptor, texture: TextureHandle) {
            self.started.lock().unwrap().push(texture);
        }
    }

    fn device() -> DeviceDescriptor {
        DeviceDescriptor::new("cam0", 1, 2, None).unwrap()
    }

    #[test]
    fn test_empty_registry_accepts() {
        let registry = DrawerRegistry::new();
        assert!(registry.accepts(&device()));
        assert!(registry.select_resolution(&device(), &FormatCatalog::default()).is_none());
    }

    #[test]
    fn test_first_claiming_drawer_wins() {
        let vga = Resolution::new(640, 480).unwrap();
        let a = Fixed::new(false, Some(Resolution::hd()));
        let b = Fixed::new(true, None);
        let c = Fixed::new(true, Some(vga));
        let d = Fixed::new(true, Some(Resolution::hd()));
        let mut registry = DrawerRegistry::new();
        for drawer in [&a, &b, &c, &d] {
            let drawer: Arc<dyn Drawer> = drawer.clone();
            registry.register(&drawer).unwrap();
        }
        assert_eq!(
            registry.select_resolution(&device(), &FormatCatalog::default()),
            Some(vga)
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let drawer: Arc<dyn Drawer> = Fixed::new(true, None);
        let mut registry = DrawerRegistry::new();
        registry.register(&drawer).unwrap();
        assert!(registry.register(&drawer).unwrap_err().is_contract_violation());
        assert!(registry.unregister(&drawer));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dropped_drawer_is_skipped() {
        let mut registry = DrawerRegistry::new();
        {
            let drawer: Arc<dyn Drawer> = Fixed::new(false, None);
            registry.register(&drawer).unwrap();
            assert!(!registry.accepts(&device()));
        }
        assert!(registry.is_empty());
        assert!(registry.accepts(&device()));
    }

    #[test]
    fn test_notify_only_claiming_drawers() {
        let claimer = Fixed::new(true, None);
        let bystander = Fixed::new(false, None);
        let mut registry = DrawerRegistry::new();
        let c: Arc<dyn Drawer> = claimer.clone();
        let b: Arc<dyn Drawer> = bystander.clone();
        registry.register(&c).unwrap();
        registry.register(&b).unwrap();

        registry.notify_preview_started(&device(), TextureHandle(9));
        assert_eq!(*claimer.started.lock().unwrap(), vec![TextureHandle(9)]);
        assert!(bystander.started.lock().unwrap().is_empty());
    }
}
