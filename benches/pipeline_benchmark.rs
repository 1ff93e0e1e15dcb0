use aq_forecast::models::{AirQualityRecord, Coordinates, LocationKey, SensorKey, WeatherRecord, FEATURE_COLUMNS};
use aq_forecast::processors::{FeatureAssembler, QualityFilter, TestSplit, TrainingSet};
use aq_forecast::regression::{GbtParams, GradientBoostedRegressor};
use aq_forecast::settings::WeatherSite;
use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// One site shared by `sensor_count` sensors, `days` of history each
fn create_city_data(
    sensor_count: usize,
    days: usize,
) -> (Vec<WeatherRecord>, Vec<AirQualityRecord>, Vec<WeatherSite>) {
    let base_date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let site = LocationKey::site("Gothenburg", "Femman");
    let sensors: Vec<SensorKey> = (0..sensor_count)
        .map(|i| SensorKey::new("Gothenburg", format!("sensor-{}", i)))
        .collect();

    let mut weather = Vec::with_capacity(days);
    let mut air_quality = Vec::with_capacity(days * sensor_count);

    for day in 0..days {
        let date = base_date + Duration::days(day as i64);
        weather.push(
            WeatherRecord::new(date, site.clone())
                .with_temp_max(Some(5.0 + (day % 20) as f64))
                .with_wind_speed_max(Some(8.0 + (day % 7) as f64))
                .with_wind_gusts_max(Some(15.0 + (day % 9) as f64))
                .with_wind_direction(Some((day * 13 % 360) as f64)),
        );

        for (i, sensor) in sensors.iter().enumerate() {
            let pm25 = 4.0 + ((day + i) % 30) as f64 * 0.7;
            air_quality.push(AirQualityRecord::observed(date, sensor.clone(), pm25));
        }
    }

    let sites = vec![WeatherSite {
        location: site,
        coordinates: Coordinates::new(57.7089, 11.9746),
        sensors,
    }];

    (weather, air_quality, sites)
}

fn benchmark_feature_assembly(c: &mut Criterion) {
    let (weather, air_quality, sites) = create_city_data(5, 400);

    c.bench_function("feature_assembly_inner", |b| {
        b.iter(|| {
            let rows = FeatureAssembler::training().assemble(&weather, &air_quality, &sites);
            black_box(rows.len())
        })
    });
}

fn benchmark_quality_filter(c: &mut Criterion) {
    let (weather, air_quality, _) = create_city_data(5, 400);
    let filter = QualityFilter::default();

    c.bench_function("quality_filter_air_quality", |b| {
        b.iter(|| {
            let outcome = filter.filter(air_quality.clone());
            black_box(outcome.accepted.len())
        })
    });

    c.bench_function("quality_filter_weather", |b| {
        b.iter(|| {
            let outcome = filter.filter(weather.clone());
            black_box(outcome.accepted.len())
        })
    });
}

fn benchmark_training_by_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("gbt_fit_by_sensors");
    group.sample_size(10);

    for &sensor_count in &[1, 5, 10] {
        let (weather, air_quality, sites) = create_city_data(sensor_count, 120);
        let rows = FeatureAssembler::training().assemble(&weather, &air_quality, &sites);
        let set = TrainingSet::split(rows, TestSplit::Fraction(0.2));
        let features: Vec<Vec<f64>> = set.train.iter().map(|r| r.feature_vector()).collect();
        let targets: Vec<f64> = set.train.iter().filter_map(|r| r.pm2_5).collect();
        let names: Vec<String> = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();

        group.bench_with_input(
            BenchmarkId::new("sensors", sensor_count),
            &sensor_count,
            |b, _| {
                b.iter(|| {
                    let params = GbtParams {
                        n_estimators: 50,
                        ..GbtParams::default()
                    };
                    let model =
                        GradientBoostedRegressor::fit(&features, &targets, names.clone(), params);
                    black_box(model.is_ok())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_feature_assembly,
    benchmark_quality_filter,
    benchmark_training_by_size
);
criterion_main!(benches);
