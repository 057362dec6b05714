use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use ndarray::{Array3, s};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::records::DecodedExample;

/// Which image of a decoded example a transform is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageField {
    /// The source-side image.
    A,
    /// The target-side image.
    B,
}

type TensorFn = dyn Fn(Array3<f32>) -> Array3<f32> + Send + Sync;
type ExampleFn = dyn Fn(DecodedExample) -> DecodedExample + Send + Sync;

/// A named, pure pixel-tensor transform.
///
/// Transforms compose with [`Transform::then`] and bind to one image of an
/// example with [`Transform::on`]. Names are carried through composition for
/// diagnostics.
#[derive(Clone)]
pub struct Transform {
    name: Cow<'static, str>,
    f: Arc<TensorFn>,
}

impl Transform {
    /// Wrap a tensor function under a diagnostic name.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Array3<f32>) -> Array3<f32> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// The distinguished no-op transform.
    pub fn identity() -> Self {
        Self::new("identity", |image| image)
    }

    /// Diagnostic name of this transform.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the transform to a tensor.
    pub fn apply(&self, image: Array3<f32>) -> Array3<f32> {
        (self.f)(image)
    }

    /// Compose: apply `self`, then `next`.
    pub fn then(self, next: Transform) -> Transform {
        let name = format!("{}|{}", self.name, next.name);
        Transform::new(name, move |image| next.apply(self.apply(image)))
    }

    /// Bind this transform to one image field of a decoded example.
    ///
    /// Only the bound field's pixel tensor is replaced; everything else in
    /// the example passes through untouched.
    pub fn on(self, field: ImageField) -> ExampleTransform {
        let name = match field {
            ImageField::A => format!("{}@A", self.name),
            ImageField::B => format!("{}@B", self.name),
        };
        ExampleTransform::new(name, move |mut example: DecodedExample| {
            let slot = match field {
                ImageField::A => &mut example.a.image,
                ImageField::B => &mut example.b.image,
            };
            let image = std::mem::replace(slot, Array3::zeros((0, 0, 0)));
            *slot = self.apply(image);
            example
        })
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

/// A named, pure transform over whole decoded examples.
#[derive(Clone)]
pub struct ExampleTransform {
    name: Cow<'static, str>,
    f: Arc<ExampleFn>,
}

impl ExampleTransform {
    /// Wrap an example function under a diagnostic name.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(DecodedExample) -> DecodedExample + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// The distinguished no-op example transform.
    pub fn identity() -> Self {
        Self::new("identity", |example| example)
    }

    /// Diagnostic name of this transform.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the transform to an example.
    pub fn apply(&self, example: DecodedExample) -> DecodedExample {
        (self.f)(example)
    }

    /// Compose: apply `self`, then `next`.
    pub fn then(self, next: ExampleTransform) -> ExampleTransform {
        let name = format!("{}|{}", self.name, next.name);
        ExampleTransform::new(name, move |example| next.apply(self.apply(example)))
    }
}

impl fmt::Debug for ExampleTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExampleTransform")
            .field("name", &self.name)
            .finish()
    }
}

fn draw_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Extract a uniformly random `size x size` window, optionally zero-padding
/// the height/width axes by `pad` first.
///
/// The same offset applies to every channel. Tensors smaller than the window
/// pass through unchanged. With a fixed `seed` the offset is reproducible.
pub fn random_crop(size: usize, pad: usize, seed: Option<u64>) -> Transform {
    Transform::new("random_crop", move |image: Array3<f32>| {
        let image = if pad > 0 { zero_pad(&image, pad) } else { image };
        let (height, width, _) = image.dim();
        if height < size || width < size {
            return image;
        }
        let mut rng = draw_rng(seed);
        let dy = rng.random_range(0..=height - size);
        let dx = rng.random_range(0..=width - size);
        image.slice(s![dy..dy + size, dx..dx + size, ..]).to_owned()
    })
}

/// Randomly mirror the tensor horizontally and/or vertically, each with
/// probability 0.5.
///
/// The vertical decision draws from `seed + 1` when a seed is given, so the
/// two axes stay decorrelated under fixed seeding.
pub fn random_flips(horizontal: bool, vertical: bool, seed: Option<u64>) -> Transform {
    Transform::new("random_flips", move |mut image: Array3<f32>| {
        if horizontal && draw_rng(seed).random_bool(0.5) {
            image = image.slice(s![.., ..;-1, ..]).to_owned();
        }
        if vertical && draw_rng(seed.map(|seed| seed + 1)).random_bool(0.5) {
            image = image.slice(s![..;-1, .., ..]).to_owned();
        }
        image
    })
}

/// Rotate by a uniformly random multiple of 90 degrees (0 to 3 turns).
pub fn random_rotations(seed: Option<u64>) -> Transform {
    Transform::new("random_rotations", move |mut image: Array3<f32>| {
        let turns = draw_rng(seed).random_range(0..4u8);
        for _ in 0..turns {
            image = rot90(&image);
        }
        image
    })
}

fn zero_pad(image: &Array3<f32>, pad: usize) -> Array3<f32> {
    let (height, width, channels) = image.dim();
    let mut padded = Array3::zeros((height + 2 * pad, width + 2 * pad, channels));
    padded
        .slice_mut(s![pad..pad + height, pad..pad + width, ..])
        .assign(image);
    padded
}

fn rot90(image: &Array3<f32>) -> Array3<f32> {
    // One counter-clockwise quarter turn: out[i, j] = in[j, w - 1 - i].
    image
        .slice(s![.., ..;-1, ..])
        .permuted_axes([1, 0, 2])
        .to_owned()
}
