mod bot_flow;
mod config_file;
