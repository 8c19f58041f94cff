//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Configuration loading and saving
//! - Default configuration when the file is absent
//! - Validation of loaded values
//! - Loaded configurations driving a controller

use camino::Utf8PathBuf;
use nqueensfaf::config::SOLVER_CONFIG_FILE;
use nqueensfaf::{ConfigManager, ExecutionController, SearchState, SolverConfig};
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(
        manager.solver_config_path(),
        config_path.join(SOLVER_CONFIG_FILE)
    );
}

#[test]
fn test_hand_written_yaml() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(
        config_path.join(SOLVER_CONFIG_FILE),
        "update_interval: 2048\n\
         auto_save_enabled: true\n\
         auto_save_percentage_step: 25.0\n\
         auto_save_path: \"saves/board-{N}.dat\"\n",
    )
    .unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    let config = manager.load_solver_config().unwrap();

    assert_eq!(config.update_interval, 2048);
    assert!(config.auto_save_enabled);
    assert!(!config.auto_delete_enabled);
    assert_eq!(config.auto_save_percentage_step, 25.0);
    assert_eq!(config.resolve_save_path(12), "saves/board-12.dat");
}

#[test]
fn test_invalid_yaml_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join(SOLVER_CONFIG_FILE), "update_interval: [oops").unwrap();

    let manager = ConfigManager::new(&config_path).unwrap();
    let err = manager.load_solver_config().unwrap_err();
    assert!(err.to_string().contains("Failed to parse solver config"));
}

#[test]
fn test_step_bounds_through_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    let file = config_path.join(SOLVER_CONFIG_FILE);

    for (step, ok) in [("0", false), ("100.0001", false), ("100", true), ("0.01", true)] {
        fs::write(&file, format!("auto_save_percentage_step: {}\n", step)).unwrap();
        assert_eq!(manager.load_solver_config().is_ok(), ok, "step {}", step);
    }
}

#[tokio::test]
async fn test_loaded_config_drives_controller() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    manager
        .save_solver_config(&SolverConfig {
            update_interval: 1,
            ..SolverConfig::default()
        })
        .unwrap();

    let config = manager.load_solver_config().unwrap();
    let controller = ExecutionController::new(SearchState::new(5).unwrap(), &config).unwrap();
    assert_eq!(controller.config().update_interval, 1);

    controller.start(&tokio::runtime::Handle::current()).unwrap();
    let report = controller.await_completion().await.unwrap();
    assert_eq!(report.solutions, 10);
}
