use common::plates::{PlateDetection, VehicleDetection};

/// A plate and the vehicle it was found on
#[derive(Debug, Clone, PartialEq)]
pub struct PlatePairing {
    pub vehicle: VehicleDetection,
    pub plate: PlateDetection,
}

/// Pair each plate with the first vehicle whose box strictly contains it.
///
/// Plates inside no vehicle are dropped. Output keeps plate order.
pub fn match_plates(vehicles: &[VehicleDetection], plates: &[PlateDetection]) -> Vec<PlatePairing> {
    plates
        .iter()
        .filter_map(|plate| {
            let owner = vehicles
                .iter()
                .find(|vehicle| vehicle.bbox.strictly_contains(&plate.bbox));

            match owner {
                Some(vehicle) => Some(PlatePairing {
                    vehicle: vehicle.clone(),
                    plate: plate.clone(),
                }),
                None => {
                    tracing::debug!(
                        plate_track_id = plate.track_id,
                        bbox = %plate.bbox,
                        "plate is not inside any vehicle, dropping"
                    );
                    None
                }
            }
        })
        .collect()
}
