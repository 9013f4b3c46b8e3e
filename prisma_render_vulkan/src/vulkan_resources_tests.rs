use super::*;

#[test]
fn test_live_fence_resolves() {
    let mut tables = ResourceTables::default();
    let handle = tables.fences.insert(vk::Fence::null());
    assert_eq!(tables.fence(handle).unwrap(), vk::Fence::null());
}

#[test]
fn test_removed_handle_is_invalid() {
    let mut tables = ResourceTables::default();
    let handle = tables.semaphores.insert(vk::Semaphore::null());
    tables.semaphores.remove(handle);

    let err = tables.semaphore(handle).unwrap_err();
    assert!(matches!(err, Error::InvalidResource(_)));
}

#[test]
fn test_reused_slot_rejects_old_handle() {
    let mut tables = ResourceTables::default();
    let old = tables.fences.insert(vk::Fence::null());
    tables.fences.remove(old);
    let new = tables.fences.insert(vk::Fence::null());

    assert!(tables.fence(new).is_ok());
    assert!(tables.fence(old).is_err());
}

#[test]
fn test_default_handle_never_resolves() {
    let tables = ResourceTables::default();
    assert!(tables.buffer(BufferHandle::default()).is_err());
    assert!(tables.pipeline(PipelineHandle::default()).is_err());
}

#[test]
fn test_live_counts() {
    let mut tables = ResourceTables::default();
    tables.fences.insert(vk::Fence::null());
    tables.fences.insert(vk::Fence::null());
    tables.semaphores.insert(vk::Semaphore::null());

    let counts = tables.live_counts();
    assert!(counts.contains(&(ResourceKind::Fence, 2)));
    assert!(counts.contains(&(ResourceKind::Semaphore, 1)));
    assert!(counts.contains(&(ResourceKind::Buffer, 0)));
}
