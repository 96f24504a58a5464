pub mod pipe_table_adapter;
pub mod static_gazetteer;

pub use pipe_table_adapter::PipeTableAdapter;
pub use static_gazetteer::StaticGazetteer;
