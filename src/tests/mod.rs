mod runtime;

mod test_limit_record;
mod test_memory_backend;
