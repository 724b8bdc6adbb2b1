use super::ChunkerMethod;

pub fn default_chunker_method() -> ChunkerMethod {
    ChunkerMethod::Gear
}

pub fn default_except_size() -> u32 {
    8192
}

pub fn default_write_buffer() -> usize {
    8 * 1024 * 1024
}

pub fn default_recipe_buffer() -> usize {
    8 * 1024 * 1024
}

pub fn default_read_buffer() -> usize {
    8 * 1024 * 1024
}

pub fn default_volume_buffer() -> usize {
    64 * 1024 * 1024
}

pub fn default_sync_flush_interval() -> u64 {
    8
}

pub fn default_queue_depth() -> usize {
    1024
}
