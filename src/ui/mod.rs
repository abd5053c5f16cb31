mod progress;
mod status;
mod table;

pub use progress::RunProgress;

pub use status::{print_command_status, CommandStatus};

pub use table::{apply_column_padding, header, number, styled_table, truncate_start};
