use std::path::PathBuf;

use sitepush_core::config::paths::{config_path_for_project, default_publish_dir, expand_home};

#[test]
fn project_config_lives_in_project_root() {
    let project_root = PathBuf::from("/workspace/site");

    let path = config_path_for_project(&project_root);

    assert_eq!(path, PathBuf::from("/workspace/site/sitepush.toml"));
}

#[test]
fn publish_dir_defaults_to_dist_in_cwd() {
    let cwd = std::env::current_dir().unwrap();

    assert_eq!(default_publish_dir(), cwd.join("dist"));
}

#[test]
fn absolute_key_path_is_untouched() {
    assert_eq!(expand_home("/keys/id_rsa"), PathBuf::from("/keys/id_rsa"));
}

#[test]
fn tilde_key_path_expands_to_home() {
    let Some(home) = dirs::home_dir() else {
        return;
    };

    assert_eq!(expand_home("~/.ssh/id_rsa"), home.join(".ssh/id_rsa"));
}
