/**
 * GPU resource ownership: the allocator arena, the batched staging uploader
 * and texture creation helpers. Everything long-lived on the device is
 * allocated here and referenced elsewhere through handles.
 */
pub mod allocator;
pub mod staging;
pub mod texture;
