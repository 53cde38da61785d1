use super::*;

impl Default for InverterConfig {
    fn default() -> Self {
        // SMA Sunny Tripower, GridMs.TotW
        Self {
            host: "192.168.178.36".to_string(),
            port: 502,
            unit_id: 3,
            power_register: 30775,
            register_count: 2,
            data_type: RegisterType::S32,
            scale: 1.0,
            connect_timeout_ms: 5000,
            read_timeout_ms: 2000,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: RelayBackend::SysfsGpio,
            gpio_pin: 27,
            active_low: false,
            sysfs_root: "/sys/class/gpio".to_string(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            turn_on_watts: 1200.0,
            turn_off_watts: 1000.0,
            min_on_seconds: 60,
            max_on_seconds: Some(300),
            min_off_seconds: 0,
            sample_interval_ms: 12_000,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            startup_grace_seconds: 60,
            backoff_initial_ms: 1000,
            backoff_max_ms: 60_000,
            max_retries_per_window: 10,
            retry_window_seconds: 600,
            shutdown_policy: ShutdownPolicy::ForceOff,
        }
    }
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            scaling_factors_file: None,
            signal_file: None,
            signal_max_age_seconds: 3600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/helios.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for SwitchLogConfig {
    fn default() -> Self {
        Self {
            path: Some("pv-switching-log.txt".to_string()),
            log_samples: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inverter: InverterConfig::default(),
            relay: RelayConfig::default(),
            thresholds: ThresholdConfig::default(),
            control: ControlConfig::default(),
            advisory: AdvisoryConfig::default(),
            logging: LoggingConfig::default(),
            switch_log: SwitchLogConfig::default(),
            timezone: "UTC".to_string(),
        }
    }
}
