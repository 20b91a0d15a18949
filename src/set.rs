use std::{any, collections::BTreeMap, fmt};

use log::{debug, trace};

use crate::{
    buffer::Buffer,
    config::{LengthPolicy, SetConfig},
    device::Device,
    error::{FsetErr, Result},
    function::{Function, check_capabilities},
    layout::FlatLayout,
};

/// Which of the two buffer sequences of a function an operation works on.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Parameters,
    Gradients,
}

impl Slot {
    fn what(self) -> &'static str {
        match self {
            Slot::Parameters => "parameters",
            Slot::Gradients => "gradients",
        }
    }

    fn of(self, func: &dyn Function) -> &[Buffer] {
        match self {
            Slot::Parameters => func.parameters(),
            Slot::Gradients => func.gradients(),
        }
    }

    fn of_mut(self, func: &mut dyn Function) -> &mut [Buffer] {
        match self {
            Slot::Parameters => func.parameters_mut(),
            Slot::Gradients => func.gradients_mut(),
        }
    }
}

/// Manager of a set of named functions.
///
/// It gives a single point to move every parameter and gradient between
/// host and device, and to read or write them as one flat sequence.
///
/// Every aggregate operation walks the functions in sorted name order,
/// concatenating each function's own ordered buffers.
pub struct FunctionSet {
    functions: BTreeMap<String, Box<dyn Function>>,
    config: SetConfig,
}

impl FunctionSet {
    /// Creates a new empty `FunctionSet` with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SetConfig::default())
    }

    /// Creates a new empty `FunctionSet`.
    ///
    /// # Arguments
    /// * `config` - The set's configuration.
    ///
    /// # Returns
    /// A new `FunctionSet` instance.
    pub fn with_config(config: SetConfig) -> Self {
        Self {
            functions: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SetConfig {
        &self.config
    }

    /// Changes how the flat setters treat trailing elements.
    pub fn set_length_policy(&mut self, policy: LengthPolicy) {
        self.config.length_policy = policy;
    }

    /// Stores `func` under `name`, replacing any previous entry.
    ///
    /// # Returns
    /// The replaced function if there was one, or `FsetErr::NotAFunction`
    /// if the function's parameters and gradients don't pair up.
    pub fn register<F: Function>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<Option<Box<dyn Function>>> {
        self.register_boxed(name, Box::new(func))
    }

    /// Same as `register`, for functions that are already type erased.
    pub fn register_boxed(
        &mut self,
        name: impl Into<String>,
        func: Box<dyn Function>,
    ) -> Result<Option<Box<dyn Function>>> {
        let name = name.into();

        if let Err(reason) = check_capabilities(func.as_ref()) {
            return Err(FsetErr::NotAFunction { name, reason });
        }

        debug!(
            name = name.as_str(),
            params = func.parameters().len(),
            replacing = self.functions.contains_key(&name);
            "registering function"
        );

        Ok(self.functions.insert(name, func))
    }

    /// Returns the function stored under `name`.
    ///
    /// # Returns
    /// The function or `FsetErr::NameNotFound`.
    pub fn lookup(&self, name: &str) -> Result<&dyn Function> {
        self.functions
            .get(name)
            .map(|func| func.as_ref())
            .ok_or_else(|| not_found(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut dyn Function> {
        match self.functions.get_mut(name) {
            Some(func) => Ok(func.as_mut()),
            None => Err(not_found(name)),
        }
    }

    /// Returns the function stored under `name` as its concrete type.
    ///
    /// # Returns
    /// The function, `FsetErr::NameNotFound` if there's none, or
    /// `FsetErr::TypeMismatch` if it isn't a `T`.
    pub fn named<T: Function>(&self, name: &str) -> Result<&T> {
        let func = self.functions.get(name).ok_or_else(|| not_found(name))?;

        (**func)
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| FsetErr::TypeMismatch {
                name: name.to_string(),
                expected: any::type_name::<T>(),
            })
    }

    pub fn named_mut<T: Function>(&mut self, name: &str) -> Result<&mut T> {
        let func = self.functions.get_mut(name).ok_or_else(|| not_found(name))?;

        (**func)
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| FsetErr::TypeMismatch {
                name: name.to_string(),
                expected: any::type_name::<T>(),
            })
    }

    /// Removes the function stored under `name`.
    ///
    /// # Returns
    /// The removed function or `FsetErr::NameNotFound`.
    pub fn remove(&mut self, name: &str) -> Result<Box<dyn Function>> {
        let func = self.functions.remove(name).ok_or_else(|| not_found(name))?;
        debug!(name = name; "removed function");
        Ok(func)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// The amount of functions in the set.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// The function names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// The functions, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Function)> {
        self.functions
            .iter()
            .map(|(name, func)| (name.as_str(), func.as_ref()))
    }

    /// Moves every parameter and gradient to `device`.
    ///
    /// Buffers already resident on a device are left untouched.
    pub fn move_to_gpu<D: Device + ?Sized>(&mut self, device: &D) -> Result<()> {
        let mut moved = 0;

        for (name, func) in self.functions.iter_mut() {
            let (params, grads) = func.parameters_and_gradients_mut();

            for buf in params.iter_mut().chain(grads.iter_mut()) {
                if buf.move_to_device(device)? {
                    trace!(name = name.as_str(), len = buf.len(); "uploaded buffer");
                    moved += 1;
                }
            }
        }

        debug!(device = device.id().0, moved = moved; "moved buffers to device");
        Ok(())
    }

    /// Moves every parameter and gradient back to host memory through `device`.
    ///
    /// Host buffers are left untouched.
    ///
    /// # Returns
    /// `FsetErr::DeviceMismatch` if a buffer lives on a device other than `device`.
    pub fn move_to_cpu<D: Device + ?Sized>(&mut self, device: &D) -> Result<()> {
        let mut moved = 0;

        for (name, func) in self.functions.iter_mut() {
            let (params, grads) = func.parameters_and_gradients_mut();

            for buf in params.iter_mut().chain(grads.iter_mut()) {
                if buf.move_to_host(device)? {
                    trace!(name = name.as_str(), len = buf.len(); "downloaded buffer");
                    moved += 1;
                }
            }
        }

        debug!(device = device.id().0, moved = moved; "moved buffers to host");
        Ok(())
    }

    /// Collects the flat parameter and gradient sequences.
    pub fn collect_parameters(&self) -> (Vec<&Buffer>, Vec<&Buffer>) {
        (self.parameters(), self.gradients())
    }

    /// Mutable version of `collect_parameters`, parameter `i` pairs with gradient `i`.
    pub fn collect_parameters_mut(&mut self) -> (Vec<&mut Buffer>, Vec<&mut Buffer>) {
        let mut params = Vec::new();
        let mut grads = Vec::new();

        for func in self.functions.values_mut() {
            let (p, g) = func.parameters_and_gradients_mut();
            params.extend(p.iter_mut());
            grads.extend(g.iter_mut());
        }

        (params, grads)
    }

    /// The flat parameter sequence.
    pub fn parameters(&self) -> Vec<&Buffer> {
        self.flat(Slot::Parameters)
    }

    /// Redistributes a flat sequence into every function's parameter slots.
    ///
    /// # Arguments
    /// * `params` - The new parameters, in the order `parameters` yields them.
    ///
    /// # Returns
    /// `FsetErr::Underflow` if there are fewer buffers than slots, `FsetErr::Overflow`
    /// if there are more and the length policy is strict, or `FsetErr::ShapeMismatch`
    /// if a buffer doesn't fit its slot. No function is modified on error.
    pub fn set_parameters<I>(&mut self, params: I) -> Result<()>
    where
        I: IntoIterator<Item = Buffer>,
    {
        self.set_flat(Slot::Parameters, params)
    }

    /// The flat gradient sequence.
    pub fn gradients(&self) -> Vec<&Buffer> {
        self.flat(Slot::Gradients)
    }

    /// Redistributes a flat sequence into every function's gradient slots.
    ///
    /// Same contract as `set_parameters`.
    pub fn set_gradients<I>(&mut self, grads: I) -> Result<()>
    where
        I: IntoIterator<Item = Buffer>,
    {
        self.set_flat(Slot::Gradients, grads)
    }

    /// The per-function segments of the flat parameter sequence.
    pub fn layout(&self) -> FlatLayout {
        self.layout_of(Slot::Parameters)
    }

    /// The amount of buffers in the flat parameter sequence.
    pub fn parameter_count(&self) -> usize {
        self.functions.values().map(|f| f.parameters().len()).sum()
    }

    /// The amount of `f32` scalars across every parameter.
    pub fn scalar_count(&self) -> usize {
        self.scalars_of(Slot::Parameters)
    }

    /// Packs every parameter into one contiguous slice.
    ///
    /// # Returns
    /// `FsetErr::SizeMismatch` if `out` isn't `scalar_count()` long, or
    /// `FsetErr::NotOnHost` if any parameter lives on a device.
    pub fn copy_parameters_to(&self, out: &mut [f32]) -> Result<()> {
        self.copy_to(Slot::Parameters, out)
    }

    /// Unpacks a contiguous slice into every parameter, the inverse of `copy_parameters_to`.
    pub fn copy_parameters_from(&mut self, src: &[f32]) -> Result<()> {
        self.copy_from(Slot::Parameters, src)
    }

    pub fn copy_gradients_to(&self, out: &mut [f32]) -> Result<()> {
        self.copy_to(Slot::Gradients, out)
    }

    pub fn copy_gradients_from(&mut self, src: &[f32]) -> Result<()> {
        self.copy_from(Slot::Gradients, src)
    }

    fn flat(&self, slot: Slot) -> Vec<&Buffer> {
        self.functions
            .values()
            .flat_map(|func| slot.of(func.as_ref()))
            .collect()
    }

    fn layout_of(&self, slot: Slot) -> FlatLayout {
        FlatLayout::new(
            self.functions
                .iter()
                .map(|(name, func)| (name.as_str(), slot.of(func.as_ref()).len())),
        )
    }

    fn scalars_of(&self, slot: Slot) -> usize {
        self.functions
            .values()
            .flat_map(|func| slot.of(func.as_ref()))
            .map(Buffer::len)
            .sum()
    }

    fn set_flat<I>(&mut self, slot: Slot, flat: I) -> Result<()>
    where
        I: IntoIterator<Item = Buffer>,
    {
        let layout = self.layout_of(slot);
        let expected = layout.len();

        let mut flat = flat.into_iter();
        let incoming: Vec<Buffer> = flat.by_ref().take(expected).collect();

        if incoming.len() < expected {
            return Err(FsetErr::Underflow {
                what: slot.what(),
                got: incoming.len(),
                expected,
            });
        }

        if flat.next().is_some() {
            match self.config.length_policy {
                LengthPolicy::IgnoreTrailing => {
                    debug!(what = slot.what(); "ignoring trailing buffers");
                }
                LengthPolicy::Strict => {
                    return Err(FsetErr::Overflow {
                        what: slot.what(),
                        expected,
                    });
                }
            }
        }

        for ((name, func), segment) in self.functions.iter().zip(layout.segments()) {
            let current = slot.of(func.as_ref());
            let replacement = &incoming[segment.range.clone()];

            for (index, (cur, new)) in current.iter().zip(replacement).enumerate() {
                if cur.shape() != new.shape() {
                    return Err(FsetErr::ShapeMismatch {
                        name: name.clone(),
                        index,
                        got: new.shape().to_vec(),
                        expected: cur.shape().to_vec(),
                    });
                }
            }
        }

        let mut incoming = incoming.into_iter();
        for func in self.functions.values_mut() {
            for (cur, new) in slot.of_mut(func.as_mut()).iter_mut().zip(incoming.by_ref()) {
                *cur = new;
            }
        }

        Ok(())
    }

    fn ensure_host(&self, slot: Slot) -> Result<()> {
        for (name, func) in &self.functions {
            if !slot.of(func.as_ref()).iter().all(Buffer::is_host) {
                return Err(FsetErr::NotOnHost { name: name.clone() });
            }
        }

        Ok(())
    }

    fn copy_to(&self, slot: Slot, out: &mut [f32]) -> Result<()> {
        let expected = self.scalars_of(slot);
        if out.len() != expected {
            return Err(FsetErr::SizeMismatch {
                what: slot.what(),
                got: out.len(),
                expected,
            });
        }

        self.ensure_host(slot)?;

        let hosts = self
            .functions
            .values()
            .flat_map(|func| slot.of(func.as_ref()))
            .filter_map(Buffer::as_host);

        let mut offset = 0;
        for host in hosts {
            let dst = &mut out[offset..offset + host.len()];
            dst.iter_mut().zip(host.iter()).for_each(|(d, s)| *d = *s);
            offset += host.len();
        }

        Ok(())
    }

    fn copy_from(&mut self, slot: Slot, src: &[f32]) -> Result<()> {
        let expected = self.scalars_of(slot);
        if src.len() != expected {
            return Err(FsetErr::SizeMismatch {
                what: slot.what(),
                got: src.len(),
                expected,
            });
        }

        self.ensure_host(slot)?;

        let hosts = self
            .functions
            .values_mut()
            .flat_map(|func| slot.of_mut(func.as_mut()))
            .filter_map(Buffer::as_host_mut);

        let mut offset = 0;
        for host in hosts {
            let n = host.len();
            host.iter_mut()
                .zip(&src[offset..offset + n])
                .for_each(|(d, s)| *d = *s);
            offset += n;
        }

        Ok(())
    }
}

impl Default for FunctionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FunctionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSet")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

fn not_found(name: &str) -> FsetErr {
    FsetErr::NameNotFound {
        name: name.to_string(),
    }
}

/// Builds a `FunctionSet` out of its initial functions.
#[derive(Default)]
pub struct FunctionSetBuilder {
    config: SetConfig,
    functions: Vec<(String, Box<dyn Function>)>,
}

impl FunctionSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn length_policy(mut self, policy: LengthPolicy) -> Self {
        self.config.length_policy = policy;
        self
    }

    /// Adds a function, a later function with the same name replaces an earlier one.
    pub fn function<F: Function>(mut self, name: impl Into<String>, func: F) -> Self {
        self.functions.push((name.into(), Box::new(func)));
        self
    }

    /// Builds the `FunctionSet`.
    ///
    /// # Returns
    /// The set, or the first registration error.
    pub fn build(self) -> Result<FunctionSet> {
        let mut set = FunctionSet::with_config(self.config);

        for (name, func) in self.functions {
            set.register_boxed(name, func)?;
        }

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::*;
    use crate::{
        config::DeviceConfig,
        device::{DeviceId, MirrorDevice},
        functions::Linear,
    };

    /// A function whose parameter `i` is filled with `base + i`.
    #[derive(Debug)]
    struct Stub {
        params: Vec<Buffer>,
        grads: Vec<Buffer>,
    }

    impl Stub {
        fn new(base: f32, n: usize) -> Self {
            let fill = |v: f32| Buffer::Host(ArrayD::from_elem(IxDyn(&[2]), v));
            Self {
                params: (0..n).map(|i| fill(base + i as f32)).collect(),
                grads: (0..n).map(|i| fill(-(base + i as f32))).collect(),
            }
        }
    }

    impl Function for Stub {
        fn parameters(&self) -> &[Buffer] {
            &self.params
        }

        fn parameters_mut(&mut self) -> &mut [Buffer] {
            &mut self.params
        }

        fn gradients(&self) -> &[Buffer] {
            &self.grads
        }

        fn gradients_mut(&mut self) -> &mut [Buffer] {
            &mut self.grads
        }

        fn parameters_and_gradients_mut(&mut self) -> (&mut [Buffer], &mut [Buffer]) {
            (&mut self.params, &mut self.grads)
        }
    }

    fn host(v: f32) -> Buffer {
        Buffer::Host(ArrayD::from_elem(IxDyn(&[2]), v))
    }

    /// `{"a": 2 params, "b": 1 param}`, registered out of order.
    fn ab() -> FunctionSet {
        FunctionSetBuilder::new()
            .function("b", Stub::new(10., 1))
            .function("a", Stub::new(0., 2))
            .build()
            .unwrap()
    }

    #[test]
    fn lookup_returns_the_registered_function() {
        let mut set = FunctionSet::new();
        assert!(set.register("f", Stub::new(1., 3)).unwrap().is_none());

        let func = set.lookup("f").unwrap();
        assert_eq!(func.parameters().len(), 3);

        let stub = set.named::<Stub>("f").unwrap();
        assert!(std::ptr::eq(
            stub.parameters().as_ptr(),
            func.parameters().as_ptr()
        ));
    }

    #[test]
    fn register_replaces() {
        let mut set = ab();
        let replaced = set.register("a", Stub::new(5., 1)).unwrap();

        assert_eq!(replaced.unwrap().parameters().len(), 2);
        assert_eq!(set.len(), 2);
        assert_eq!(set.parameter_count(), 2);
    }

    #[test]
    fn register_rejects_unpaired_gradients() {
        let mut stub = Stub::new(0., 2);
        stub.grads.pop();

        let mut set = FunctionSet::new();
        let Err(err) = set.register("bad", stub) else {
            panic!("unpaired gradients were accepted");
        };
        assert!(matches!(err, FsetErr::NotAFunction { ref name, .. } if name == "bad"));
        assert!(set.is_empty());
    }

    #[test]
    fn missing_names() {
        let mut set = ab();
        assert!(matches!(set.lookup("z"), Err(FsetErr::NameNotFound { .. })));
        assert!(matches!(set.lookup_mut("z"), Err(FsetErr::NameNotFound { .. })));
        assert!(matches!(set.remove("z"), Err(FsetErr::NameNotFound { .. })));
        assert!(matches!(set.named::<Stub>("z"), Err(FsetErr::NameNotFound { .. })));
    }

    #[test]
    fn named_with_the_wrong_type() {
        let mut set = ab();
        assert!(matches!(
            set.named::<Linear>("a"),
            Err(FsetErr::TypeMismatch { .. })
        ));
        assert!(matches!(
            set.named_mut::<Linear>("a"),
            Err(FsetErr::TypeMismatch { .. })
        ));
    }

    #[test]
    fn named_mut_edits_in_place() {
        let mut set = ab();
        set.named_mut::<Stub>("b").unwrap().params[0] = host(99.);
        assert_eq!(set.parameters()[2], &host(99.));
    }

    #[test]
    fn flat_parameters_follow_name_order() {
        let set = ab();
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, ["a", "b"]);

        let params = set.parameters();
        assert_eq!(params, [&host(0.), &host(1.), &host(10.)]);

        let (params, grads) = set.collect_parameters();
        assert_eq!(params.len(), 3);
        assert_eq!(grads, [&host(-0.), &host(-1.), &host(-10.)]);
    }

    #[test]
    fn remove_shrinks_the_flat_sequence() {
        let mut set = ab();
        let removed = set.remove("a").unwrap();
        assert_eq!(removed.parameters().len(), 2);

        assert!(matches!(set.lookup("a"), Err(FsetErr::NameNotFound { .. })));
        assert!(!set.contains("a"));

        let (params, _) = set.collect_parameters();
        assert_eq!(params, [&host(10.)]);
    }

    #[test]
    fn set_parameters_round_trip() {
        let mut set = ab();
        let before: Vec<Buffer> = set.parameters().into_iter().cloned().collect();

        set.set_parameters(before.clone()).unwrap();
        let after: Vec<Buffer> = set.parameters().into_iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn set_parameters_redistributes_by_segment() {
        let mut set = ab();
        set.set_parameters([host(7.), host(8.), host(9.)]).unwrap();

        assert_eq!(set.lookup("a").unwrap().parameters(), [host(7.), host(8.)]);
        assert_eq!(set.lookup("b").unwrap().parameters(), [host(9.)]);
        // gradients are untouched
        assert_eq!(set.gradients()[0], &host(-0.));
    }

    #[test]
    fn set_parameters_underflow_changes_nothing() {
        let mut set = ab();
        let err = set.set_parameters([host(7.)]).unwrap_err();

        assert!(matches!(
            err,
            FsetErr::Underflow {
                got: 1,
                expected: 3,
                ..
            }
        ));
        assert_eq!(set.parameters(), [&host(0.), &host(1.), &host(10.)]);
    }

    #[test]
    fn trailing_buffers_follow_the_length_policy() {
        let mut set = ab();
        let four = || [host(1.), host(2.), host(3.), host(4.)];

        set.set_parameters(four()).unwrap();
        assert_eq!(set.parameters(), [&host(1.), &host(2.), &host(3.)]);

        set.set_length_policy(LengthPolicy::Strict);
        let err = set.set_gradients(four()).unwrap_err();
        assert!(matches!(err, FsetErr::Overflow { expected: 3, .. }));
        assert_eq!(set.gradients()[0], &host(-0.));
    }

    #[test]
    fn trailing_buffers_of_endless_iterators_are_ignored() {
        let mut set = ab();
        set.set_parameters(std::iter::repeat(host(5.))).unwrap();
        assert_eq!(set.parameters(), [&host(5.); 3]);
    }

    #[test]
    fn misshapen_buffers_are_rejected() {
        let mut set = ab();
        let wide = Buffer::Host(ArrayD::zeros(IxDyn(&[3])));
        let err = set.set_gradients([host(1.), wide, host(3.)]).unwrap_err();

        assert!(matches!(
            err,
            FsetErr::ShapeMismatch { ref name, index: 1, .. } if name == "a"
        ));
        assert_eq!(set.gradients()[0], &host(-0.));
    }

    #[test]
    fn device_round_trip() {
        let dev = MirrorDevice::new(DeviceConfig { ordinal: 1 });
        let mut set = ab();
        let original: Vec<Buffer> = set.parameters().into_iter().cloned().collect();

        set.move_to_gpu(&dev).unwrap();
        let (params, grads) = set.collect_parameters();
        assert!(params.iter().chain(&grads).all(|b| b.device() == Some(DeviceId(1))));

        let once: Vec<Buffer> = set.parameters().into_iter().cloned().collect();
        set.move_to_gpu(&dev).unwrap();
        let twice: Vec<Buffer> = set.parameters().into_iter().cloned().collect();
        assert_eq!(once, twice);

        set.move_to_cpu(&dev).unwrap();
        let restored: Vec<Buffer> = set.parameters().into_iter().cloned().collect();
        assert_eq!(restored, original);
        assert!(set.gradients().iter().all(|b| b.is_host()));
    }

    #[test]
    fn move_to_cpu_through_the_wrong_device_fails() {
        let mut set = ab();
        set.move_to_gpu(&MirrorDevice::new(DeviceConfig { ordinal: 0 }))
            .unwrap();

        let err = set
            .move_to_cpu(&MirrorDevice::new(DeviceConfig { ordinal: 1 }))
            .unwrap_err();
        assert!(matches!(err, FsetErr::DeviceMismatch { .. }));
    }

    #[test]
    fn collect_parameters_mut_pairs_parameters_with_gradients() {
        let mut set = ab();
        let (params, grads) = set.collect_parameters_mut();

        for (p, g) in params.into_iter().zip(grads) {
            let g = g.as_host().unwrap().clone();
            *p.as_host_mut().unwrap() += &g;
        }

        assert!(set.parameters().iter().all(|p| **p == host(0.)));
    }

    #[test]
    fn layout_matches_segments() {
        let set = ab();
        let layout = set.layout();

        assert_eq!(layout.len(), set.parameter_count());
        assert_eq!(layout.segment("a"), Some(0..2));
        assert_eq!(layout.segment("b"), Some(2..3));
        assert_eq!(set.scalar_count(), 6);
    }

    #[test]
    fn contiguous_copies() {
        let mut set = ab();
        let mut flat = vec![0.; set.scalar_count()];

        set.copy_parameters_to(&mut flat).unwrap();
        assert_eq!(flat, [0., 0., 1., 1., 10., 10.]);

        let doubled: Vec<f32> = flat.iter().map(|x| x * 2.).collect();
        set.copy_parameters_from(&doubled).unwrap();
        assert_eq!(set.parameters()[2], &host(20.));

        let mut grads = vec![0.; 6];
        set.copy_gradients_to(&mut grads).unwrap();
        set.copy_gradients_from(&grads).unwrap();
        assert_eq!(grads[4], -10.);
    }

    #[test]
    fn contiguous_copies_validate_inputs() {
        let mut set = ab();
        assert!(matches!(
            set.copy_parameters_from(&[1.; 5]),
            Err(FsetErr::SizeMismatch {
                got: 5,
                expected: 6,
                ..
            })
        ));

        set.move_to_gpu(&MirrorDevice::new(DeviceConfig::default()))
            .unwrap();
        let mut out = [0.; 6];
        assert!(matches!(
            set.copy_parameters_to(&mut out),
            Err(FsetErr::NotOnHost { .. })
        ));
        assert!(matches!(
            set.copy_gradients_from(&out),
            Err(FsetErr::NotOnHost { .. })
        ));
    }

    #[test]
    fn builder_reports_bad_functions() {
        let mut stub = Stub::new(0., 1);
        stub.grads[0] = Buffer::Host(ArrayD::zeros(IxDyn(&[5])));

        let res = FunctionSetBuilder::new()
            .length_policy(LengthPolicy::Strict)
            .function("ok", Stub::new(0., 1))
            .function("bad", stub)
            .build();
        assert!(matches!(res, Err(FsetErr::NotAFunction { .. })));
    }

    #[test]
    fn empty_set() {
        let mut set = FunctionSet::new();
        assert!(set.parameters().is_empty());
        assert!(set.layout().is_empty());
        set.set_parameters(Vec::new()).unwrap();
        set.move_to_gpu(&MirrorDevice::new(DeviceConfig::default()))
            .unwrap();
    }

    #[test]
    fn iter_walks_functions_in_name_order() {
        let set = ab();
        let counts: Vec<_> = set
            .iter()
            .map(|(name, func)| (name, func.parameters().len()))
            .collect();
        assert_eq!(counts, [("a", 2), ("b", 1)]);
    }

    #[test]
    fn config_follows_the_length_policy() {
        let mut set = FunctionSetBuilder::new()
            .length_policy(LengthPolicy::Strict)
            .build()
            .unwrap();
        assert_eq!(set.config().length_policy, LengthPolicy::Strict);

        set.set_length_policy(LengthPolicy::IgnoreTrailing);
        assert_eq!(set.config().length_policy, LengthPolicy::IgnoreTrailing);
        assert_eq!(set.config().device, DeviceConfig::default());
    }
}
