//! Transfer buffer representations and the resolver that unifies them
//!
//! A transfer exposes its payload either as a flat byte buffer or through a
//! memory descriptor that has to be mapped before the bytes are addressable.
//! `resolve` turns whichever one is usable into a single `ResolvedSpan`.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::FilterError;

/// Pages backing a memory descriptor
struct DescriptorPages {
    resident: AtomicBool,
    byte_count: usize,
    bytes: Mutex<Box<[u8]>>,
}

/// Handle to a buffer that must be mapped before use
///
/// Clones share the same pages, the way the layers above and below the filter
/// share one descriptor.
#[derive(Clone)]
pub struct MemoryDescriptor {
    pages: Arc<DescriptorPages>,
}

impl MemoryDescriptor {
    /// Descriptor over resident pages
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            pages: Arc::new(DescriptorPages {
                resident: AtomicBool::new(true),
                byte_count: bytes.len(),
                bytes: Mutex::new(bytes),
            }),
        }
    }

    /// Descriptor whose pages are not resident; mapping fails until paged in
    pub fn paged_out(bytes: impl Into<Box<[u8]>>) -> Self {
        let descriptor = Self::new(bytes);
        descriptor.set_resident(false);
        descriptor
    }

    pub fn set_resident(&self, resident: bool) {
        self.pages.resident.store(resident, Ordering::Release);
    }

    pub fn byte_count(&self) -> usize {
        self.pages.byte_count
    }

    /// Copy of the current contents (waits for any mapping in progress)
    pub fn to_vec(&self) -> Vec<u8> {
        self.pages.bytes.lock().to_vec()
    }

    /// Map the pages without blocking
    ///
    /// Fails if the pages are not resident or another context holds the
    /// mapping right now.
    fn try_map(&self) -> Option<MutexGuard<'_, Box<[u8]>>> {
        if !self.pages.resident.load(Ordering::Acquire) {
            return None;
        }
        self.pages.bytes.try_lock()
    }
}

impl fmt::Debug for MemoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDescriptor")
            .field("byte_count", &self.pages.byte_count)
            .field("resident", &self.pages.resident.load(Ordering::Relaxed))
            .finish()
    }
}

/// The payload reference carried by a transfer
///
/// Both halves may be present at once; the flat buffer wins.
#[derive(Debug, Default)]
pub struct TransferBuffer {
    pub flat: Option<Box<[u8]>>,
    pub descriptor: Option<MemoryDescriptor>,
}

impl TransferBuffer {
    pub fn flat(bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            flat: Some(bytes.into()),
            descriptor: None,
        }
    }

    pub fn descriptor(descriptor: MemoryDescriptor) -> Self {
        Self {
            flat: None,
            descriptor: Some(descriptor),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Copy of the payload bytes from whichever representation is present
    pub fn to_vec(&self) -> Vec<u8> {
        match (&self.flat, &self.descriptor) {
            (Some(flat), _) => flat.to_vec(),
            (None, Some(descriptor)) => descriptor.to_vec(),
            (None, None) => Vec::new(),
        }
    }
}

enum SpanBytes<'a> {
    Flat(&'a mut [u8]),
    Mapped(MutexGuard<'a, Box<[u8]>>),
}

/// One addressable span over the transfer payload, bounded by the declared length
pub struct ResolvedSpan<'a> {
    bytes: SpanBytes<'a>,
    len: usize,
}

impl<'a> ResolvedSpan<'a> {
    /// Whether the span came from a mapped descriptor rather than a flat buffer
    pub fn is_mapped(&self) -> bool {
        matches!(self.bytes, SpanBytes::Mapped(_))
    }
}

impl Deref for ResolvedSpan<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.bytes {
            SpanBytes::Flat(b) => &b[..self.len],
            SpanBytes::Mapped(g) => &g[..self.len],
        }
    }
}

impl DerefMut for ResolvedSpan<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.bytes {
            SpanBytes::Flat(b) => &mut b[..self.len],
            SpanBytes::Mapped(g) => &mut g[..self.len],
        }
    }
}

/// Resolve a transfer buffer into one span of at most `declared_length` bytes
///
/// Never blocks: a descriptor that cannot be mapped immediately yields
/// `FilterError::UnresolvedBuffer`, which callers treat as "leave this
/// transfer alone".
pub fn resolve(
    buffer: &mut TransferBuffer,
    declared_length: usize,
) -> Result<ResolvedSpan<'_>, FilterError> {
    if let Some(flat) = buffer.flat.as_deref_mut() {
        if buffer.descriptor.is_some() {
            debug!("Both flat buffer and descriptor present, ignoring descriptor");
        }
        let len = declared_length.min(flat.len());
        return Ok(ResolvedSpan {
            bytes: SpanBytes::Flat(flat),
            len,
        });
    }

    if let Some(descriptor) = buffer.descriptor.as_ref() {
        return match descriptor.try_map() {
            Some(guard) => {
                let len = declared_length.min(guard.len());
                Ok(ResolvedSpan {
                    bytes: SpanBytes::Mapped(guard),
                    len,
                })
            }
            None => {
                debug!("Could not map transfer descriptor without blocking");
                Err(FilterError::UnresolvedBuffer)
            }
        };
    }

    debug!("Neither flat buffer nor descriptor present");
    Err(FilterError::UnresolvedBuffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_span_bounded_by_declared_length() {
        let mut buf = TransferBuffer::flat(vec![1u8, 2, 3, 4, 5, 6]);
        let span = resolve(&mut buf, 4).unwrap();
        assert_eq!(&*span, &[1, 2, 3, 4]);
        assert!(!span.is_mapped());
    }

    #[test]
    fn test_declared_length_past_capacity_is_clamped() {
        let mut buf = TransferBuffer::flat(vec![1u8, 2, 3]);
        let span = resolve(&mut buf, 64).unwrap();
        assert_eq!(span.len(), 3);
    }

    #[test]
    fn test_descriptor_span_writes_through() {
        let descriptor = MemoryDescriptor::new(vec![0u8; 8]);
        let mut buf = TransferBuffer::descriptor(descriptor.clone());
        {
            let mut span = resolve(&mut buf, 8).unwrap();
            assert!(span.is_mapped());
            span[3] = 0xAA;
        }
        assert_eq!(descriptor.to_vec()[3], 0xAA);
    }

    #[test]
    fn test_paged_out_descriptor_is_unresolved() {
        let descriptor = MemoryDescriptor::paged_out(vec![0u8; 8]);
        let mut buf = TransferBuffer::descriptor(descriptor.clone());
        assert!(matches!(
            resolve(&mut buf, 8),
            Err(FilterError::UnresolvedBuffer)
        ));

        descriptor.set_resident(true);
        assert!(resolve(&mut buf, 8).is_ok());
    }

    #[test]
    fn test_busy_descriptor_is_unresolved_not_blocking() {
        let descriptor = MemoryDescriptor::new(vec![0u8; 8]);
        let mut buf = TransferBuffer::descriptor(descriptor.clone());
        let _held = descriptor.pages.bytes.lock();
        assert!(matches!(
            resolve(&mut buf, 8),
            Err(FilterError::UnresolvedBuffer)
        ));
    }

    #[test]
    fn test_flat_preferred_over_descriptor() {
        let descriptor = MemoryDescriptor::new(vec![0xEEu8; 4]);
        let mut buf = TransferBuffer {
            flat: Some(vec![0x11u8; 4].into()),
            descriptor: Some(descriptor.clone()),
        };
        let mut span = resolve(&mut buf, 4).unwrap();
        span[0] = 0x22;
        drop(span);
        assert_eq!(buf.to_vec(), vec![0x22, 0x11, 0x11, 0x11]);
        assert_eq!(descriptor.to_vec(), vec![0xEE; 4]);
    }

    #[test]
    fn test_empty_buffer_is_unresolved() {
        let mut buf = TransferBuffer::empty();
        assert!(resolve(&mut buf, 12).is_err());
    }
}
