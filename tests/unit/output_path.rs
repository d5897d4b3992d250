//! Canonical local paths

use std::path::PathBuf;

use bybit_bulk_downloader::output::PathResolver;
use bybit_bulk_downloader::{Category, DataType, Interval};

#[test]
fn test_archive_paths_are_deterministic_for_every_archive_type() {
    let resolver = PathResolver::new("/mnt/market");
    let other = PathResolver::new(PathBuf::from("/mnt/market"));

    for data_type in DataType::ALL.iter().filter(|dt| dt.is_archive()) {
        let url = if data_type.has_year_level() {
            format!("https://public.bybit.com/{data_type}/ADAUSDT/2023/ADAUSDT_5_2023-06-01_2023-06-30.csv.gz")
        } else {
            format!("https://public.bybit.com/{data_type}/ADAUSDT/ADAUSDT2023-06-01.csv.gz")
        };

        let first = resolver.resolve_archive(&url).unwrap();
        assert_eq!(first, resolver.resolve_archive(&url).unwrap());
        assert_eq!(first, other.resolve_archive(&url).unwrap());

        assert!(first.starts_with(format!("/mnt/market/bybit_data/{data_type}/ADAUSDT")));
        assert_eq!(first.extension().unwrap(), "csv");
    }
}

#[test]
fn test_host_does_not_change_local_path() {
    let resolver = PathResolver::new("/data");
    let remote = resolver
        .resolve_archive("https://public.bybit.com/spot/BTCUSDT/BTCUSDT_2022-11-01.csv.gz")
        .unwrap();
    let mirror = resolver
        .resolve_archive("http://127.0.0.1:8080/spot/BTCUSDT/BTCUSDT_2022-11-01.csv.gz")
        .unwrap();
    assert_eq!(remote, mirror);
}

#[test]
fn test_metatrader_year_directory() {
    let resolver = PathResolver::new("/data");
    let path = resolver
        .resolve_archive("https://public.bybit.com/kline_for_metatrader4/BTCUSDT/2021/BTCUSDT_15_2021-01-01_2021-01-31.csv.gz")
        .unwrap();
    assert_eq!(
        path,
        PathBuf::from("/data/bybit_data/kline_for_metatrader4/BTCUSDT/2021/BTCUSDT_15_2021-01-01_2021-01-31.csv")
    );
}

#[test]
fn test_api_layout() {
    let resolver = PathResolver::new("/data");
    assert_eq!(
        resolver.resolve_funding("ETHUSDT"),
        PathBuf::from("/data/bybit_data/fundingRate/ETHUSDT.csv")
    );
    assert_eq!(
        resolver.resolve_klines(Category::Spot, "ETHUSDT", Interval::OneWeek),
        PathBuf::from("/data/bybit_data/klines/spot/ETHUSDT/W.csv")
    );
    assert_eq!(
        resolver.kline_parts_dir(Category::Spot, "ETHUSDT", Interval::OneWeek),
        PathBuf::from("/data/bybit_data/klines/spot/ETHUSDT/W_parts")
    );
}
