pub mod api;
pub mod core;

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("lung_score"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // 桌面端由宿主程序安装 logger
    }
}
