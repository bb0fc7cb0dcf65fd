use crate::frame::{ChannelLayout, Geometry};

/// Opaque reference to GPU-resident pixels.
///
/// A handle names a slot plus the generation it was published at. Slots are
/// single-buffered: publishing new content into a slot makes every earlier
/// handle for it stale, and resolving a stale handle fails instead of reading
/// whatever the slot holds now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureHandle {
    slot: u32,
    generation: u64,
    geometry: Geometry,
    layout: ChannelLayout,
}

impl TextureHandle {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextureError {
    #[error("texture handle for slot {slot} is stale (held generation {held}, slot is at {current})")]
    Stale { slot: u32, held: u64, current: u64 },
    #[error("unknown texture slot {0}")]
    UnknownSlot(u32),
    #[error("texture slot {0} has no published content")]
    Unpublished(u32),
}

struct Slot<T> {
    generation: u64,
    published: bool,
    payload: Option<T>,
}

/// Table of single-buffered texture slots with generation tracking.
///
/// `T` is the backing storage (a GPU texture in the renderer, plain bytes in
/// tests). Writers fetch the payload with [`TextureSlots::payload_mut`], fill it,
/// then [`TextureSlots::publish`] to mint a fresh handle.
pub struct TextureSlots<T> {
    slots: Vec<Slot<T>>,
}

impl<T> TextureSlots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a new slot and returns its id.
    pub fn allocate(&mut self) -> u32 {
        self.slots.push(Slot {
            generation: 0,
            published: false,
            payload: None,
        });
        (self.slots.len() - 1) as u32
    }

    /// Current backing storage of a slot, published or not.
    pub fn payload(&self, slot: u32) -> Result<Option<&T>, TextureError> {
        self.slots
            .get(slot as usize)
            .map(|entry| entry.payload.as_ref())
            .ok_or(TextureError::UnknownSlot(slot))
    }

    pub fn payload_mut(&mut self, slot: u32) -> Result<&mut Option<T>, TextureError> {
        self.slots
            .get_mut(slot as usize)
            .map(|entry| &mut entry.payload)
            .ok_or(TextureError::UnknownSlot(slot))
    }

    /// Marks the slot's current payload as the latest content and returns a handle to it.
    pub fn publish(
        &mut self,
        slot: u32,
        geometry: Geometry,
        layout: ChannelLayout,
    ) -> Result<TextureHandle, TextureError> {
        let entry = self
            .slots
            .get_mut(slot as usize)
            .ok_or(TextureError::UnknownSlot(slot))?;
        if entry.payload.is_none() {
            return Err(TextureError::Unpublished(slot));
        }
        entry.generation += 1;
        entry.published = true;
        Ok(TextureHandle {
            slot,
            generation: entry.generation,
            geometry,
            layout,
        })
    }

    pub fn resolve(&self, handle: &TextureHandle) -> Result<&T, TextureError> {
        let entry = self
            .slots
            .get(handle.slot as usize)
            .ok_or(TextureError::UnknownSlot(handle.slot))?;
        if entry.generation != handle.generation {
            return Err(TextureError::Stale {
                slot: handle.slot,
                held: handle.generation,
                current: entry.generation,
            });
        }
        match (&entry.payload, entry.published) {
            (Some(payload), true) => Ok(payload),
            _ => Err(TextureError::Unpublished(handle.slot)),
        }
    }
}

impl<T> Default for TextureSlots<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> Geometry {
        Geometry::new(4, 2)
    }

    #[test]
    fn publishing_again_makes_previous_handle_stale() {
        let mut slots = TextureSlots::new();
        let slot = slots.allocate();
        *slots.payload_mut(slot).unwrap() = Some(vec![1u8]);
        let first = slots
            .publish(slot, geometry(), ChannelLayout::Rgba8)
            .unwrap();
        assert_eq!(slots.resolve(&first).unwrap(), &vec![1u8]);

        *slots.payload_mut(slot).unwrap() = Some(vec![2u8]);
        let second = slots
            .publish(slot, geometry(), ChannelLayout::Rgba8)
            .unwrap();
        assert!(second.generation() > first.generation());
        assert_eq!(
            slots.resolve(&first),
            Err(TextureError::Stale {
                slot,
                held: first.generation(),
                current: second.generation(),
            })
        );
        assert_eq!(slots.resolve(&second).unwrap(), &vec![2u8]);
    }

    #[test]
    fn empty_slots_cannot_be_published() {
        let mut slots: TextureSlots<()> = TextureSlots::new();
        let slot = slots.allocate();
        assert_eq!(
            slots.publish(slot, geometry(), ChannelLayout::Bgra8),
            Err(TextureError::Unpublished(slot))
        );
        assert_eq!(
            slots.publish(7, geometry(), ChannelLayout::Bgra8),
            Err(TextureError::UnknownSlot(7))
        );
    }

    #[test]
    fn slots_are_independent() {
        let mut slots = TextureSlots::new();
        let input = slots.allocate();
        let output = slots.allocate();
        *slots.payload_mut(input).unwrap() = Some("in");
        *slots.payload_mut(output).unwrap() = Some("out");
        let a = slots.publish(input, geometry(), ChannelLayout::Bgra8).unwrap();
        let b = slots.publish(output, geometry(), ChannelLayout::Rgba8).unwrap();
        slots.publish(input, geometry(), ChannelLayout::Bgra8).unwrap();
        assert!(slots.resolve(&a).is_err());
        assert_eq!(*slots.resolve(&b).unwrap(), "out");
        assert_ne!(input, output);
    }
}
